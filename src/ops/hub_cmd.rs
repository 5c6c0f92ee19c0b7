// ops/hub_cmd.rs - Hub item lifecycle with cross-profile integrity

use crate::error::CcpError;
use crate::hub::{self, item_key};
use crate::manifest::ProfileManifest;
use crate::paths::{CcpPaths, HubItemType};
use crate::registry::RootConfig;
use crate::{fsutil, symlink};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

// --- Protection list -------------------------------------------------------

/// Read hub/.protected: newline-delimited "type/name" keys.
pub fn load_protected(paths: &CcpPaths) -> Result<BTreeSet<String>> {
    let path = paths.protected_file();
    if !path.is_file() {
        return Ok(BTreeSet::new());
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

pub fn save_protected(paths: &CcpPaths, protected: &BTreeSet<String>) -> Result<()> {
    let mut content = protected.iter().cloned().collect::<Vec<_>>().join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fsutil::atomic_write(&paths.protected_file(), &content)
}

pub fn protect(paths: &CcpPaths, key: &str) -> Result<()> {
    let mut protected = load_protected(paths)?;
    if protected.insert(key.to_string()) {
        save_protected(paths, &protected)?;
        println!("Protected: {key}");
    } else {
        println!("Already protected: {key}");
    }
    Ok(())
}

pub fn unprotect(paths: &CcpPaths, key: &str) -> Result<()> {
    let mut protected = load_protected(paths)?;
    if protected.remove(key) {
        save_protected(paths, &protected)?;
        println!("Unprotected: {key}");
    } else {
        println!("Not protected: {key}");
    }
    Ok(())
}

// --- Cross-profile reference map -------------------------------------------

/// Map of "type/name" -> referencing profile names, across every profile.
pub fn reference_map(paths: &CcpPaths) -> Result<BTreeMap<String, Vec<String>>> {
    let mut refs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for profile in crate::ops::profile::list(paths)? {
        let manifest = match ProfileManifest::load_from_dir(&paths.profile_dir(&profile)) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Warning: skipping profile '{profile}': {e:#}");
                continue;
            }
        };
        for item_type in HubItemType::ALL {
            let names: Vec<&String> = if item_type == HubItemType::Hooks {
                manifest.hooks_for_compose().iter().collect()
            } else {
                manifest.get_hub_items(item_type).iter().collect()
            };
            for name in names {
                refs.entry(item_key(item_type, name))
                    .or_default()
                    .push(profile.clone());
            }
        }
    }
    Ok(refs)
}

// --- add / remove / rename -------------------------------------------------

/// Add an item to the hub from a filesystem path. A path inside a profile
/// is promoted: moved into the hub, re-linked in place, and added to that
/// profile's manifest.
pub fn add(
    paths: &CcpPaths,
    item_type: HubItemType,
    src: &Path,
    name: Option<&str>,
    replace: bool,
) -> Result<()> {
    if !src.exists() {
        return Err(CcpError::not_found(format!("{}", src.display())).into());
    }
    let src = fs::canonicalize(src)?;
    let derived = src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("cannot derive an item name from {}", src.display()))?;
    let entry = name.map(str::to_string).unwrap_or(derived);
    let item_name = hub::name_from_entry(item_type, &entry)
        .unwrap_or(entry.clone());

    let dest = hub::item_path(paths, item_type, &item_name);
    if dest.exists() {
        if !replace {
            return Err(
                CcpError::already_exists(format!("hub item {item_type}/{item_name}")).into(),
            );
        }
        fsutil::remove_any(&dest)?;
    }

    let owning_profile = profile_owning(paths, &src)?;
    match &owning_profile {
        Some(profile) => {
            // Promotion: move out of the profile, leave a symlink behind.
            fsutil::move_path(&src, &dest)?;
            symlink::create(&src, &dest)?;
            let mut manifest = ProfileManifest::load_from_dir(&paths.profile_dir(profile))?;
            manifest.add_hub_item(item_type, &item_name);
            manifest.save(&paths.profile_manifest(profile))?;
            println!("Promoted {item_type}/{item_name} out of profile '{profile}'");
        }
        None => {
            fsutil::copy_entry(&src, &dest, true)?;
            println!("Added {item_type}/{item_name} to the hub");
        }
    }
    Ok(())
}

/// The profile (if any) whose directory contains `path` as a real entry.
fn profile_owning(paths: &CcpPaths, path: &Path) -> Result<Option<String>> {
    let profiles = paths.profiles_dir();
    let Ok(profiles) = fs::canonicalize(&profiles) else {
        return Ok(None);
    };
    let Ok(rest) = path.strip_prefix(&profiles) else {
        return Ok(None);
    };
    Ok(rest
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .filter(|n| n != crate::paths::SHARED_DIR_NAME))
}

/// Remove a hub item. Referencing profiles block removal unless forced.
pub fn remove(paths: &CcpPaths, item_type: HubItemType, name: &str, force: bool) -> Result<()> {
    let item = hub::item_path(paths, item_type, name);
    if !item.exists() {
        return Err(CcpError::not_found(format!("hub item {item_type}/{name}")).into());
    }

    let key = item_key(item_type, name);
    let refs = reference_map(paths)?;
    if let Some(profiles) = refs.get(&key) {
        if !profiles.is_empty() {
            eprintln!(
                "Warning: {key} is referenced by profile(s): {}",
                profiles.join(", ")
            );
            if !force {
                anyhow::bail!("refusing to remove {key} while referenced (use --force)");
            }
        }
    }

    fsutil::remove_any(&item)?;

    let mut config = RootConfig::load(paths)?;
    if config.forget_installed(&key) {
        config.save(paths)?;
    }
    println!("Removed {key}");
    Ok(())
}

/// Rename a hub item and update every referencing profile's manifest and
/// symlink, the registry, and the protection list in one logical step.
pub fn rename(paths: &CcpPaths, item_type: HubItemType, old: &str, new: &str) -> Result<()> {
    let old_path = hub::item_path(paths, item_type, old);
    if !old_path.exists() {
        return Err(CcpError::not_found(format!("hub item {item_type}/{old}")).into());
    }
    let new_path = hub::item_path(paths, item_type, new);
    if new_path.exists() {
        return Err(CcpError::already_exists(format!("hub item {item_type}/{new}")).into());
    }

    fs::rename(&old_path, &new_path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            old_path.display(),
            new_path.display()
        )
    })?;

    for profile in crate::ops::profile::list(paths)? {
        let profile_dir = paths.profile_dir(&profile);
        let Ok(mut manifest) = ProfileManifest::load_from_dir(&profile_dir) else {
            continue;
        };

        let mut touched = rename_in_list(manifest.hub.get_mut(item_type), old, new);
        if item_type == HubItemType::Hooks && !manifest.legacy_hooks.is_empty() {
            let legacy_touched = rename_in_list(&mut manifest.legacy_hooks, old, new);
            if legacy_touched && manifest.hub.hooks.is_empty() {
                // Saving drops the legacy list, so promote it first.
                manifest.hub.hooks = manifest.legacy_hooks.clone();
                manifest.legacy_hooks.clear();
            }
            touched |= legacy_touched;
        }
        if !touched {
            continue;
        }

        manifest.save(&paths.profile_manifest(&profile))?;

        let old_link = profile_dir
            .join(item_type.dir_name())
            .join(hub::entry_name(item_type, old));
        symlink::remove(&old_link)?;
        let new_link = profile_dir
            .join(item_type.dir_name())
            .join(hub::entry_name(item_type, new));
        symlink::create(&new_link, &new_path)?;
        debug!(%profile, "re-pointed link after rename");

        if matches!(
            item_type,
            HubItemType::Hooks | HubItemType::SettingFragments
        ) {
            crate::composer::write_settings(paths, &profile)?;
        }
    }

    let mut config = RootConfig::load(paths)?;
    config.rename_installed(&item_key(item_type, old), &item_key(item_type, new));
    config.save(paths)?;

    let mut protected = load_protected(paths)?;
    if protected.remove(&item_key(item_type, old)) {
        protected.insert(item_key(item_type, new));
        save_protected(paths, &protected)?;
    }

    println!("Renamed {item_type}/{old} -> {item_type}/{new}");
    Ok(())
}

/// Replace `old` with `new` in place, preserving order. Returns true if
/// anything changed.
fn rename_in_list(list: &mut Vec<String>, old: &str, new: &str) -> bool {
    let mut touched = false;
    for entry in list.iter_mut() {
        if entry == old {
            *entry = new.to_string();
            touched = true;
        }
    }
    touched
}

// --- usage / prune ---------------------------------------------------------

#[derive(Debug, Default)]
pub struct UsageReport {
    /// Hub items no profile references.
    pub orphans: Vec<String>,
    /// Referenced items that do not exist in the hub.
    pub missing: Vec<String>,
    /// Items referenced by more than one profile.
    pub shared: Vec<String>,
}

pub fn usage(paths: &CcpPaths) -> Result<UsageReport> {
    let config = RootConfig::load(paths)?;
    let items = hub::scan(paths, &config)?;
    let refs = reference_map(paths)?;

    let on_disk: BTreeSet<String> = items.iter().map(|i| i.key()).collect();

    let mut report = UsageReport::default();
    for item in &items {
        match refs.get(&item.key()) {
            None => report.orphans.push(item.key()),
            Some(profiles) if profiles.len() > 1 => report.shared.push(item.key()),
            Some(_) => {}
        }
    }
    for key in refs.keys() {
        if !on_disk.contains(key) {
            report.missing.push(key.clone());
        }
    }
    Ok(report)
}

/// Remove unreferenced hub items. Protected items never qualify as
/// orphans, and referenced items are never touched.
pub fn prune(paths: &CcpPaths, dry_run: bool) -> Result<Vec<String>> {
    let protected = load_protected(paths)?;
    let orphans: Vec<String> = usage(paths)?
        .orphans
        .into_iter()
        .filter(|key| !protected.contains(key))
        .collect();

    if orphans.is_empty() {
        println!("Nothing to prune");
        return Ok(orphans);
    }

    let mut config = RootConfig::load(paths)?;
    let mut registry_changed = false;
    for key in &orphans {
        if dry_run {
            println!("> Would remove {key}");
            continue;
        }
        let (type_str, name) = key
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("malformed item key '{key}'"))?;
        let item_type: HubItemType = type_str
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        fsutil::remove_any(&hub::item_path(paths, item_type, name))?;
        registry_changed |= config.forget_installed(key);
        println!("Pruned {key}");
    }
    if registry_changed {
        config.save(paths)?;
    }
    Ok(orphans)
}

/// Print every hub item with its provenance.
pub fn list(paths: &CcpPaths, item_type: Option<HubItemType>) -> Result<()> {
    let config = RootConfig::load(paths)?;
    let refs = reference_map(paths)?;
    let items = match item_type {
        Some(t) => hub::scan_type(paths, &config, t)?,
        None => hub::scan(paths, &config)?,
    };
    for item in items {
        let count = refs.get(&item.key()).map(Vec::len).unwrap_or(0);
        println!(
            "{:<40} {:<28} used by {} profile(s)",
            item.key(),
            item.source_info(),
            count
        );
    }
    Ok(())
}
