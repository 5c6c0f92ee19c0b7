// tests/init_reset.rs - Initial migration and its inverse

mod common;

use ccp::ops::init::{self, InitOptions};
use ccp::ops::reset;
use ccp::paths::{DataItemType, HubItemType};
use common::{assert_relative_link, TestEnv};
use std::fs;

#[test]
fn init_minimal_dir_builds_hub_profile_and_symlink() {
    let env = TestEnv::new();
    env.live_file("CLAUDE.md", "# x");
    env.live_file("skills/foo/SKILL.md", "bar");

    env.init();
    let paths = env.paths();

    // Skill moved into the hub.
    let hub_skill = paths.hub_item(HubItemType::Skills, "foo");
    assert_eq!(fs::read_to_string(hub_skill.join("SKILL.md")).unwrap(), "bar");

    // Profile carries the config file and a relative link to the hub.
    let profile = paths.profile_dir("default");
    assert_eq!(fs::read_to_string(profile.join("CLAUDE.md")).unwrap(), "# x");
    assert_relative_link(&profile.join("skills/foo"), &hub_skill);

    // The live path is now a symlink into the default profile.
    assert!(paths.live_is_symlink());
    assert_eq!(
        fs::canonicalize(&env.live).unwrap(),
        fs::canonicalize(&profile).unwrap()
    );

    // The moved skill is declared in the manifest.
    let manifest = ccp::manifest::ProfileManifest::load_from_dir(&profile).unwrap();
    assert_eq!(manifest.hub.skills, vec!["foo"]);
}

#[test]
fn init_dry_run_changes_nothing() {
    let env = TestEnv::new();
    env.live_file("skills/foo/SKILL.md", "bar");
    let paths = env.paths();

    let opts = InitOptions {
        dry_run: true,
        ..Default::default()
    };
    let plan = init::plan(&paths, &opts).unwrap();
    assert_eq!(plan.hub_moves.len(), 1);
    init::print_plan(&plan);

    assert!(!paths.is_initialized());
    assert!(env.live.join("skills/foo/SKILL.md").is_file());
}

#[test]
fn init_refuses_a_second_run() {
    let env = TestEnv::new();
    env.live_file("skills/foo/SKILL.md", "bar");
    env.init();

    let err = init::plan(&env.paths(), &InitOptions::default()).unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[test]
fn init_shares_and_isolates_data_dirs() {
    let env = TestEnv::new();
    env.live_file("skills/foo/SKILL.md", "bar");
    env.live_file("todos/a.json", "{}");
    env.live_file("history/h.jsonl", "{}");

    env.init();
    let paths = env.paths();

    // todos default to shared: moved under shared/ and linked.
    let todos_link = paths.profile_data_dir("default", DataItemType::Todos);
    assert_relative_link(&todos_link, &paths.shared_data_dir(DataItemType::Todos));
    assert!(paths
        .shared_data_dir(DataItemType::Todos)
        .join("a.json")
        .is_file());

    // history defaults to isolated: a real dir inside the profile.
    let history = paths.profile_data_dir("default", DataItemType::History);
    assert!(history.is_dir() && !history.is_symlink());
    assert!(history.join("h.jsonl").is_file());
}

#[test]
fn init_moves_unrecognized_files_into_the_profile() {
    let env = TestEnv::new();
    env.live_file("skills/foo/SKILL.md", "bar");
    env.live_file("notes.txt", "keep me");
    env.live_file(".credentials.json", "secret");

    env.init();
    let profile = env.paths().profile_dir("default");
    assert_eq!(fs::read_to_string(profile.join("notes.txt")).unwrap(), "keep me");
    assert_eq!(
        fs::read_to_string(profile.join(".credentials.json")).unwrap(),
        "secret"
    );
}

#[test]
fn reset_restores_copies_not_symlinks() {
    let env = TestEnv::new();
    env.live_file("CLAUDE.md", "# x");
    env.live_file("skills/foo/SKILL.md", "bar");
    env.init();
    let paths = env.paths();

    reset::reset(&paths).unwrap();

    // The live path is a plain directory again.
    assert!(env.live.is_dir());
    assert!(!env.live.is_symlink());

    // The skill came back as a real file, not a link.
    assert!(!env.live.join("skills/foo").is_symlink());
    assert_eq!(
        fs::read_to_string(env.live.join("skills/foo/SKILL.md")).unwrap(),
        "bar"
    );
    assert_eq!(fs::read_to_string(env.live.join("CLAUDE.md")).unwrap(), "# x");

    // ccp leaves nothing behind.
    assert!(!env.live.join("profile.toml").exists());
    assert!(!paths.root().exists());
}

#[test]
fn reset_rewrites_hook_paths_into_the_live_dir() {
    let env = TestEnv::new();
    let script = env.live_file("hooks/s.sh", "#!/bin/sh\nexit 0\n");
    env.live_settings(&serde_json::json!({
        "hooks": {
            "SessionStart": [
                { "matcher": "startup", "hooks": [
                    { "type": "command", "command": script.display().to_string(), "timeout": 30 }
                ] }
            ]
        }
    }));
    env.init();
    let paths = env.paths();

    reset::reset(&paths).unwrap();

    let settings: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(env.live.join("settings.json")).unwrap()).unwrap();
    let command = settings["hooks"]["SessionStart"][0]["hooks"][0]["command"]
        .as_str()
        .unwrap();
    let expected_root = ccp::fsutil::home_prefixed(&env.live.join("hooks/s"));
    assert_eq!(command, format!("{expected_root}/scripts/s.sh"));
    // And the script it names actually exists there.
    assert!(env.live.join("hooks/s/scripts/s.sh").is_file());
}
