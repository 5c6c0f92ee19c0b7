// ops/reset.rs - Materialize the active profile back into a plain directory

use crate::error::CcpError;
use crate::fsutil::{self, home_prefixed};
use crate::paths::{CcpPaths, HubItemType, LEGACY_MANIFEST_FILE, MANIFEST_FILE, SETTINGS_FILE};
use crate::symlink;
use anyhow::{Context, Result};
use std::fs;
use tracing::debug;

/// Files that belong to ccp, not the assistant; they stay out of the
/// materialized directory.
const EXCLUDED: [&str; 3] = [MANIFEST_FILE, LEGACY_MANIFEST_FILE, "profile.yaml.bak"];

/// Undo the migration: the live path becomes a free-standing directory with
/// every symlink resolved to a copy, and the root is removed.
///
/// Nothing is destroyed until the materialized copy renames into place; a
/// failure before that leaves the live symlink and the root untouched.
pub fn reset(paths: &CcpPaths) -> Result<()> {
    let live = paths.live_dir().to_path_buf();
    if !paths.live_is_symlink() {
        return Err(CcpError::not_found(format!(
            "live symlink at {} (nothing to reset)",
            live.display()
        ))
        .into());
    }

    let profile_dir = symlink::resolved_target(&live)?;
    if !profile_dir.is_dir() {
        return Err(CcpError::not_found(format!(
            "active profile directory {}",
            profile_dir.display()
        ))
        .into());
    }
    let profile_name = profile_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let perms = fs::metadata(&profile_dir)
        .with_context(|| format!("failed to stat {}", profile_dir.display()))?
        .permissions();

    // Materialize next to the live path so the final rename stays on one
    // filesystem.
    let staging = live.with_extension("ccp-reset");
    fsutil::remove_any(&staging)?;
    fs::create_dir_all(&staging)?;

    let mut entries: Vec<_> = fs::read_dir(&profile_dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if EXCLUDED.contains(&name.as_str()) {
            continue;
        }
        debug!(entry = %name, "materializing");
        fsutil::copy_entry(&entry.path(), &staging.join(&name), true)?;
    }

    rewrite_settings_paths(&staging.join(SETTINGS_FILE), &profile_dir, &live)?;

    // Point of no return: replace the symlink with the materialized dir.
    symlink::remove(&live)?;
    if let Err(e) = fs::rename(&staging, &live) {
        // Put the symlink back so the system stays usable.
        let _ = symlink::create(&live, &profile_dir);
        return Err(e)
            .with_context(|| format!("failed to move {} into place", staging.display()));
    }
    fs::set_permissions(&live, perms)
        .with_context(|| format!("failed to chmod {}", live.display()))?;

    fs::remove_dir_all(paths.root())
        .with_context(|| format!("failed to remove {}", paths.root().display()))?;

    println!(
        "Reset: {} is a plain directory again (profile '{}' materialized)",
        live.display(),
        profile_name
    );
    Ok(())
}

/// Hook commands in the composed settings point under
/// `profiles/<name>/hooks/`; after reset those scripts live under the live
/// dir instead.
fn rewrite_settings_paths(
    settings_path: &std::path::Path,
    profile_dir: &std::path::Path,
    live: &std::path::Path,
) -> Result<()> {
    if !settings_path.is_file() {
        return Ok(());
    }
    let content = fs::read_to_string(settings_path)
        .with_context(|| format!("failed to read {}", settings_path.display()))?;

    let profile_hooks = profile_dir.join(HubItemType::Hooks.dir_name());
    let live_hooks = live.join(HubItemType::Hooks.dir_name());
    let rewritten = content
        .replace(
            &home_prefixed(&profile_hooks),
            &home_prefixed(&live_hooks),
        )
        .replace(
            &profile_hooks.display().to_string(),
            &live_hooks.display().to_string(),
        );

    if rewritten != content {
        fs::write(settings_path, rewritten)
            .with_context(|| format!("failed to rewrite {}", settings_path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ProfileManifest;
    use tempfile::TempDir;

    #[test]
    fn reset_refuses_without_live_symlink() {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("claude");
        fs::create_dir_all(&live).unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), &live);

        assert!(reset(&paths).is_err());
        assert!(live.is_dir());
    }

    #[test]
    fn reset_materializes_symlinked_items() {
        let tmp = TempDir::new().unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), tmp.path().join("claude"));

        // Minimal initialized layout: one hub skill, one profile linking it.
        let hub_item = paths.hub_item(HubItemType::Skills, "foo");
        fs::create_dir_all(&hub_item).unwrap();
        fs::write(hub_item.join("SKILL.md"), "bar").unwrap();

        let profile = paths.profile_dir("default");
        fs::create_dir_all(&profile).unwrap();
        let mut m = ProfileManifest::new("default", None);
        m.add_hub_item(HubItemType::Skills, "foo");
        m.save(&paths.profile_manifest("default")).unwrap();
        fs::write(profile.join("CLAUDE.md"), "# x").unwrap();
        symlink::create(&paths.profile_link("default", HubItemType::Skills, "foo"), &hub_item)
            .unwrap();
        symlink::create(paths.live_dir(), &profile).unwrap();

        reset(&paths).unwrap();

        let live = paths.live_dir();
        assert!(live.is_dir() && !live.is_symlink());
        let skill = live.join("skills/foo/SKILL.md");
        assert!(!live.join("skills/foo").is_symlink());
        assert_eq!(fs::read_to_string(skill).unwrap(), "bar");
        assert_eq!(fs::read_to_string(live.join("CLAUDE.md")).unwrap(), "# x");
        // ccp-specific files stay behind, and the root is gone.
        assert!(!live.join(MANIFEST_FILE).exists());
        assert!(!paths.root().exists());
    }
}
