// ops/profile.rs - Profile lifecycle: create, clone, delete, switch, sync

use crate::composer;
use crate::drift::{self, FixOptions};
use crate::error::CcpError;
use crate::hub;
use crate::manifest::ProfileManifest;
use crate::paths::{CcpPaths, DataItemType, HubItemType, ShareMode, SHARED_DIR_NAME};
use crate::symlink;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

fn require_initialized(paths: &CcpPaths) -> Result<()> {
    if !paths.is_initialized() {
        return Err(CcpError::NotInitialized {
            root: paths.root().to_path_buf(),
        }
        .into());
    }
    Ok(())
}

fn validate_profile_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name != SHARED_DIR_NAME
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(CcpError::InvalidName {
            name: name.to_string(),
            reason: "profile names are [A-Za-z0-9_-] and 'shared' is reserved".to_string(),
        }
        .into())
    }
}

/// Profiles on disk, sorted. `shared/` is layout, not a profile.
pub fn list(paths: &CcpPaths) -> Result<Vec<String>> {
    require_initialized(paths)?;
    let dir = paths.profiles_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name == SHARED_DIR_NAME || name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// The profile the live symlink currently points into, if any.
pub fn active(paths: &CcpPaths) -> Result<Option<String>> {
    if !paths.live_is_symlink() {
        return Ok(None);
    }
    let target = symlink::resolved_target(paths.live_dir())?;
    let profiles = paths.profiles_dir();
    let canonical_profiles = fs::canonicalize(&profiles).unwrap_or(profiles);
    let canonical_target = fs::canonicalize(&target).unwrap_or(target);
    Ok(canonical_target
        .strip_prefix(&canonical_profiles)
        .ok()
        .and_then(|rest| rest.components().next())
        .map(|c| c.as_os_str().to_string_lossy().to_string()))
}

/// Create an empty profile: type dirs, data dirs per the default share
/// config, a fresh manifest, and composed settings.
pub fn create(paths: &CcpPaths, name: &str, description: Option<String>) -> Result<()> {
    require_initialized(paths)?;
    validate_profile_name(name)?;
    let profile_dir = paths.profile_dir(name);
    if profile_dir.exists() {
        return Err(CcpError::already_exists(format!("profile '{name}'")).into());
    }

    fs::create_dir_all(&profile_dir)?;
    for item_type in HubItemType::ALL {
        fs::create_dir_all(paths.profile_type_dir(name, item_type))?;
    }

    let mut manifest = ProfileManifest::new(name, description);
    setup_data_dirs(paths, name, &manifest)?;
    manifest.save(&paths.profile_manifest(name))?;
    composer::write_settings(paths, name)?;

    println!("Created profile '{name}'");
    Ok(())
}

/// Create each data dir according to its share mode: a symlink into
/// shared/ or a real directory.
fn setup_data_dirs(paths: &CcpPaths, profile: &str, manifest: &ProfileManifest) -> Result<()> {
    for data in DataItemType::ALL {
        let local = paths.profile_data_dir(profile, data);
        match manifest.get_data_share_mode(data) {
            ShareMode::Shared => {
                let shared = paths.shared_data_dir(data);
                fs::create_dir_all(&shared)?;
                symlink::create(&local, &shared)?;
            }
            ShareMode::Isolated => {
                fs::create_dir_all(&local)?;
            }
        }
    }
    Ok(())
}

/// Clone a profile: same hub links and data config under a new name, every
/// hub item re-linked, loose files copied, settings recomposed.
pub fn clone(paths: &CcpPaths, src: &str, dst: &str) -> Result<()> {
    require_initialized(paths)?;
    validate_profile_name(dst)?;
    let src_dir = paths.profile_dir(src);
    if !src_dir.is_dir() {
        return Err(CcpError::not_found(format!("profile '{src}'")).into());
    }
    if paths.profile_dir(dst).exists() {
        return Err(CcpError::already_exists(format!("profile '{dst}'")).into());
    }

    let src_manifest = ProfileManifest::load_from_dir(&src_dir)?;
    let mut manifest = ProfileManifest::new(dst, src_manifest.description.clone());
    manifest.hub = src_manifest.hub.clone();
    manifest.data = src_manifest.data.clone();

    let dst_dir = paths.profile_dir(dst);
    fs::create_dir_all(&dst_dir)?;
    for item_type in HubItemType::ALL {
        fs::create_dir_all(paths.profile_type_dir(dst, item_type))?;
        for name in manifest.get_hub_items(item_type) {
            let link = dst_dir
                .join(item_type.dir_name())
                .join(hub::entry_name(item_type, name));
            symlink::create(&link, &hub::item_path(paths, item_type, name))?;
        }
    }
    setup_data_dirs(paths, dst, &manifest)?;

    // Loose files (CLAUDE.md and friends) come along; generated and
    // ccp-owned files do not.
    for entry in fs::read_dir(&src_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        if !path.is_file() || path.is_symlink() {
            continue;
        }
        if name == crate::paths::MANIFEST_FILE
            || name == crate::paths::LEGACY_MANIFEST_FILE
            || name == crate::paths::SETTINGS_FILE
        {
            continue;
        }
        crate::fsutil::copy_entry(&path, &dst_dir.join(&name), false)?;
    }

    manifest.save(&paths.profile_manifest(dst))?;
    composer::write_settings(paths, dst)?;

    println!("Cloned profile '{src}' -> '{dst}'");
    Ok(())
}

/// Delete a profile. The active profile and the last remaining profile are
/// protected.
pub fn delete(paths: &CcpPaths, name: &str) -> Result<()> {
    require_initialized(paths)?;
    let profile_dir = paths.profile_dir(name);
    if !profile_dir.is_dir() {
        return Err(CcpError::not_found(format!("profile '{name}'")).into());
    }
    if active(paths)?.as_deref() == Some(name) {
        anyhow::bail!("profile '{name}' is active; switch away before deleting it");
    }
    if list(paths)?.len() <= 1 {
        anyhow::bail!("refusing to delete the only profile");
    }

    fs::remove_dir_all(&profile_dir)
        .with_context(|| format!("failed to remove {}", profile_dir.display()))?;
    println!("Deleted profile '{name}'");
    Ok(())
}

/// Switch the live symlink to another profile. Settings regeneration after
/// a successful swap degrades to a warning.
pub fn use_profile(paths: &CcpPaths, name: &str) -> Result<()> {
    require_initialized(paths)?;
    let profile_dir = paths.profile_dir(name);
    if !profile_dir.is_dir() {
        return Err(CcpError::not_found(format!("profile '{name}'")).into());
    }
    if paths.live_is_real_dir() {
        anyhow::bail!(
            "{} is a real directory; run `ccp init` before switching profiles",
            paths.live_dir().display()
        );
    }

    symlink::swap(paths.live_dir(), &profile_dir)?;
    debug!(profile = name, "live symlink swapped");

    if let Err(e) = composer::write_settings(paths, name) {
        eprintln!("Warning: switched to '{name}' but settings regeneration failed: {e:#}");
    }
    println!("Now using profile '{name}'");
    Ok(())
}

/// Reconcile drift and recompose settings for one profile (or every
/// profile when `name` is None).
pub fn sync(paths: &CcpPaths, name: Option<&str>) -> Result<()> {
    require_initialized(paths)?;
    let targets = match name {
        Some(n) => vec![n.to_string()],
        None => list(paths)?,
    };
    for profile in &targets {
        let report = drift::detect(paths, profile)?;
        if report.has_drift() {
            let outcome = drift::fix(paths, profile, &report, &FixOptions::default())?;
            for action in &outcome.actions {
                println!("  {action}");
            }
            if outcome.unresolved > 0 {
                eprintln!(
                    "Warning: {} unresolved hub-missing item(s) in '{profile}'",
                    outcome.unresolved
                );
            }
        }
        composer::write_settings(paths, profile)?;
        println!("Synced '{profile}'");
    }
    Ok(())
}

/// Add one hub item to a profile: manifest entry + symlink + (when it
/// affects settings) recomposition.
pub fn link(paths: &CcpPaths, profile: &str, item_type: HubItemType, name: &str) -> Result<()> {
    require_initialized(paths)?;
    if !hub::item_exists(paths, item_type, name) {
        return Err(CcpError::not_found(format!("hub item {}/{name}", item_type)).into());
    }
    let profile_dir = paths.profile_dir(profile);
    let mut manifest = ProfileManifest::load_from_dir(&profile_dir)?;
    if !manifest.add_hub_item(item_type, name) {
        println!("Already linked: {item_type}/{name}");
        return Ok(());
    }

    let link_path = profile_dir
        .join(item_type.dir_name())
        .join(hub::entry_name(item_type, name));
    symlink::create(&link_path, &hub::item_path(paths, item_type, name))?;
    manifest.save(&paths.profile_manifest(profile))?;

    if affects_settings(item_type) {
        composer::write_settings(paths, profile)?;
    }
    println!("Linked {item_type}/{name} into '{profile}'");
    Ok(())
}

/// Remove one hub item from a profile.
pub fn unlink(paths: &CcpPaths, profile: &str, item_type: HubItemType, name: &str) -> Result<()> {
    require_initialized(paths)?;
    let profile_dir = paths.profile_dir(profile);
    let mut manifest = ProfileManifest::load_from_dir(&profile_dir)?;
    let in_manifest = manifest.remove_hub_item(item_type, name);
    if item_type == HubItemType::Hooks {
        manifest.legacy_hooks.retain(|n| n != name);
    }
    if !in_manifest {
        return Err(CcpError::not_found(format!("{item_type}/{name} in '{profile}'")).into());
    }

    let link_path = profile_dir
        .join(item_type.dir_name())
        .join(hub::entry_name(item_type, name));
    symlink::remove(&link_path)?;
    manifest.save(&paths.profile_manifest(profile))?;

    if affects_settings(item_type) {
        composer::write_settings(paths, profile)?;
    }
    println!("Unlinked {item_type}/{name} from '{profile}'");
    Ok(())
}

fn affects_settings(item_type: HubItemType) -> bool {
    matches!(
        item_type,
        HubItemType::Hooks | HubItemType::SettingFragments
    )
}

/// Spawn a shell or command with the assistant's config-dir variable
/// pointing at a profile, so it can be tried without switching.
pub fn run(paths: &CcpPaths, profile: &str, command: &[String]) -> Result<i32> {
    require_initialized(paths)?;
    let profile_dir = paths.profile_dir(profile);
    if !profile_dir.is_dir() {
        return Err(CcpError::not_found(format!("profile '{profile}'")).into());
    }

    let (program, args): (String, &[String]) = match command {
        [] => (
            std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
            &[],
        ),
        [program, rest @ ..] => (program.clone(), rest),
    };

    println!("Running with profile '{profile}' (CLAUDE_CONFIG_DIR={})", profile_dir.display());
    let status = std::process::Command::new(&program)
        .args(args)
        .env("CLAUDE_CONFIG_DIR", &profile_dir)
        .status()
        .with_context(|| format!("failed to launch {program}"))?;
    Ok(status.code().unwrap_or(1))
}

/// Resolve the profile argument, defaulting to the active one.
pub fn resolve_target(paths: &CcpPaths, name: Option<&str>) -> Result<String> {
    match name {
        Some(n) => Ok(n.to_string()),
        None => active(paths)?.ok_or_else(|| {
            anyhow::anyhow!("no active profile; pass a profile name explicitly")
        }),
    }
}

/// Open a path in $EDITOR (vi fallback).
pub fn open_in_editor(path: &Path) -> Result<()> {
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = std::process::Command::new(&editor)
        .arg(path)
        .status()
        .with_context(|| format!("failed to launch {editor}"))?;
    if !status.success() {
        anyhow::bail!("{editor} exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_root(paths: &CcpPaths) {
        fs::create_dir_all(paths.hub_dir()).unwrap();
        fs::create_dir_all(paths.profiles_dir()).unwrap();
        fs::create_dir_all(paths.shared_dir()).unwrap();
    }

    #[test]
    fn create_lays_out_data_dirs_per_share_mode() {
        let tmp = TempDir::new().unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), tmp.path().join("claude"));
        init_root(&paths);

        create(&paths, "work", Some("work things".to_string())).unwrap();

        assert!(paths.profile_manifest("work").is_file());
        assert!(paths.profile_settings("work").is_file());
        // tasks shared -> symlink; history isolated -> real dir
        let tasks = paths.profile_data_dir("work", DataItemType::Tasks);
        assert!(tasks.is_symlink());
        assert!(paths.shared_data_dir(DataItemType::Tasks).is_dir());
        let history = paths.profile_data_dir("work", DataItemType::History);
        assert!(history.is_dir() && !history.is_symlink());
    }

    #[test]
    fn create_rejects_reserved_and_duplicate_names() {
        let tmp = TempDir::new().unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), tmp.path().join("claude"));
        init_root(&paths);

        assert!(create(&paths, "shared", None).is_err());
        assert!(create(&paths, "bad/name", None).is_err());
        create(&paths, "work", None).unwrap();
        assert!(create(&paths, "work", None).is_err());
    }

    #[test]
    fn clone_relinks_hub_items() {
        let tmp = TempDir::new().unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), tmp.path().join("claude"));
        init_root(&paths);
        let hub_item = paths.hub_item(HubItemType::Skills, "foo");
        fs::create_dir_all(&hub_item).unwrap();

        create(&paths, "base", None).unwrap();
        link(&paths, "base", HubItemType::Skills, "foo").unwrap();
        fs::write(paths.profile_dir("base").join("CLAUDE.md"), "# hi").unwrap();

        clone(&paths, "base", "copy").unwrap();

        let cloned_link = paths.profile_link("copy", HubItemType::Skills, "foo");
        assert!(symlink::validate(&cloned_link, &hub_item));
        assert_eq!(
            fs::read_to_string(paths.profile_dir("copy").join("CLAUDE.md")).unwrap(),
            "# hi"
        );
        let m = ProfileManifest::load_from_dir(&paths.profile_dir("copy")).unwrap();
        assert_eq!(m.name, "copy");
        assert_eq!(m.hub.skills, vec!["foo"]);
    }

    #[test]
    fn delete_protects_active_and_last_profile() {
        let tmp = TempDir::new().unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), tmp.path().join("claude"));
        init_root(&paths);
        create(&paths, "only", None).unwrap();

        // Last profile.
        assert!(delete(&paths, "only").is_err());

        create(&paths, "second", None).unwrap();
        symlink::create(paths.live_dir(), &paths.profile_dir("second")).unwrap();

        // Active profile.
        assert!(delete(&paths, "second").is_err());
        // Non-active, non-last is fine.
        delete(&paths, "only").unwrap();
        assert!(!paths.profile_dir("only").exists());
    }

    #[test]
    fn use_profile_swaps_the_live_symlink() {
        let tmp = TempDir::new().unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), tmp.path().join("claude"));
        init_root(&paths);
        create(&paths, "a", None).unwrap();
        create(&paths, "b", None).unwrap();
        symlink::create(paths.live_dir(), &paths.profile_dir("a")).unwrap();

        use_profile(&paths, "b").unwrap();

        assert_eq!(active(&paths).unwrap().as_deref(), Some("b"));
        assert!(symlink::validate(paths.live_dir(), &paths.profile_dir("b")));
    }

    #[test]
    fn link_and_unlink_keep_manifest_and_disk_aligned() {
        let tmp = TempDir::new().unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), tmp.path().join("claude"));
        init_root(&paths);
        let hub_item = paths.hub_item(HubItemType::Agents, "helper");
        fs::create_dir_all(&hub_item).unwrap();
        create(&paths, "p", None).unwrap();

        link(&paths, "p", HubItemType::Agents, "helper").unwrap();
        assert!(crate::drift::detect(&paths, "p").unwrap().items.is_empty());

        unlink(&paths, "p", HubItemType::Agents, "helper").unwrap();
        assert!(!paths.profile_link("p", HubItemType::Agents, "helper").exists());
        let m = ProfileManifest::load_from_dir(&paths.profile_dir("p")).unwrap();
        assert!(!m.references(HubItemType::Agents, "helper"));
    }
}
