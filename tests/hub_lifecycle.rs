// tests/hub_lifecycle.rs - Hub item lifecycle across profiles

mod common;

use ccp::manifest::ProfileManifest;
use ccp::ops::{hub_cmd, profile};
use ccp::paths::HubItemType;
use common::{assert_relative_link, TestEnv};
use std::fs;

/// Init with one skill, then clone the default profile so two profiles
/// reference the same hub items.
fn two_profiles_sharing_alpha() -> TestEnv {
    let env = TestEnv::new();
    env.live_file("skills/alpha/SKILL.md", "a");
    env.init();
    profile::clone(&env.paths(), "default", "work").unwrap();
    env
}

#[test]
fn rename_propagates_to_every_referencing_profile() {
    let env = two_profiles_sharing_alpha();
    let paths = env.paths();

    hub_cmd::rename(&paths, HubItemType::Skills, "alpha", "beta").unwrap();

    assert!(paths.hub_item(HubItemType::Skills, "beta").is_dir());
    assert!(!paths.hub_item(HubItemType::Skills, "alpha").exists());

    for name in ["default", "work"] {
        let manifest = ProfileManifest::load_from_dir(&paths.profile_dir(name)).unwrap();
        assert!(manifest.references(HubItemType::Skills, "beta"));
        assert!(!manifest.references(HubItemType::Skills, "alpha"));

        assert_relative_link(
            &paths.profile_link(name, HubItemType::Skills, "beta"),
            &paths.hub_item(HubItemType::Skills, "beta"),
        );
        assert!(!paths.profile_link(name, HubItemType::Skills, "alpha").exists());
    }

    // Nothing drifts after the rename.
    for name in ["default", "work"] {
        assert!(!ccp::drift::detect(&paths, name).unwrap().has_drift());
    }
}

#[test]
fn remove_warns_and_requires_force_while_referenced() {
    let env = two_profiles_sharing_alpha();
    let paths = env.paths();

    assert!(hub_cmd::remove(&paths, HubItemType::Skills, "alpha", false).is_err());
    assert!(paths.hub_item(HubItemType::Skills, "alpha").is_dir());

    hub_cmd::remove(&paths, HubItemType::Skills, "alpha", true).unwrap();
    assert!(!paths.hub_item(HubItemType::Skills, "alpha").exists());

    // What remains is hub-missing drift, by design.
    let report = ccp::drift::detect(&paths, "default").unwrap();
    assert_eq!(report.items[0].kind, ccp::drift::DriftKind::HubMissing);
}

#[test]
fn prune_only_touches_unprotected_orphans() {
    let env = two_profiles_sharing_alpha();
    let paths = env.paths();

    for orphan in ["stale", "sacred"] {
        fs::create_dir_all(paths.hub_item(HubItemType::Skills, orphan)).unwrap();
    }
    hub_cmd::protect(&paths, "skills/sacred").unwrap();

    // Dry run names the candidate without removing it.
    let candidates = hub_cmd::prune(&paths, true).unwrap();
    assert_eq!(candidates, vec!["skills/stale"]);
    assert!(paths.hub_item(HubItemType::Skills, "stale").is_dir());

    let removed = hub_cmd::prune(&paths, false).unwrap();
    assert_eq!(removed, vec!["skills/stale"]);
    assert!(!paths.hub_item(HubItemType::Skills, "stale").exists());
    assert!(paths.hub_item(HubItemType::Skills, "sacred").is_dir());
    assert!(paths.hub_item(HubItemType::Skills, "alpha").is_dir());
}

#[test]
fn usage_sees_shared_items_across_profiles() {
    let env = two_profiles_sharing_alpha();
    let paths = env.paths();
    fs::create_dir_all(paths.hub_item(HubItemType::Agents, "unused")).unwrap();

    let report = hub_cmd::usage(&paths).unwrap();
    assert!(report.shared.contains(&"skills/alpha".to_string()));
    assert!(report.orphans.contains(&"agents/unused".to_string()));
    assert!(report.missing.is_empty());
}

#[test]
fn switching_profiles_swaps_the_live_symlink() {
    let env = two_profiles_sharing_alpha();
    let paths = env.paths();

    assert_eq!(profile::active(&paths).unwrap().as_deref(), Some("default"));
    profile::use_profile(&paths, "work").unwrap();
    assert_eq!(profile::active(&paths).unwrap().as_deref(), Some("work"));

    // The live symlink still stores a relative target after the swap.
    let stored = fs::read_link(&env.live).unwrap();
    assert!(stored.is_relative());

    // And the assistant sees the work profile's files through it.
    assert!(env.live.join("skills/alpha/SKILL.md").exists());
}

#[test]
fn unlink_then_sync_leaves_a_clean_profile() {
    let env = two_profiles_sharing_alpha();
    let paths = env.paths();

    profile::unlink(&paths, "work", HubItemType::Skills, "alpha").unwrap();
    profile::sync(&paths, Some("work")).unwrap();

    assert!(!ccp::drift::detect(&paths, "work").unwrap().has_drift());
    let manifest = ProfileManifest::load_from_dir(&paths.profile_dir("work")).unwrap();
    assert!(manifest.hub.skills.is_empty());
    // The other profile is untouched.
    let manifest = ProfileManifest::load_from_dir(&paths.profile_dir("default")).unwrap();
    assert_eq!(manifest.hub.skills, vec!["alpha"]);
}
