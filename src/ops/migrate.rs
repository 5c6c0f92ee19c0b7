// ops/migrate.rs - Idempotent in-place schema upgrades

use crate::hooks::{LegacyHook, HOOKS_FILE, LEGACY_HOOK_FILE, SCRIPTS_DIR};
use crate::hub::{self, item_key, Source, SourceType, LEGACY_SOURCE_FILE};
use crate::manifest::{ProfileManifest, MANIFEST_VERSION};
use crate::paths::{CcpPaths, HubItemType, SharedPluginStoreItem};
use crate::registry::{RootConfig, SourceEntry};
use crate::{fsutil, symlink};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// One schema upgrade. Each is safe to run repeatedly; `needs` reports
/// whether anything is left to do.
pub struct Migrator {
    pub name: &'static str,
    pub needs: fn(&CcpPaths) -> Result<bool>,
    pub run: fn(&CcpPaths) -> Result<usize>,
}

/// The documented execution order.
pub fn all() -> [Migrator; 6] {
    [
        Migrator {
            name: "manifest yaml -> toml",
            needs: manifests_need,
            run: migrate_manifests,
        },
        Migrator {
            name: "source.yaml -> registry",
            needs: sources_need,
            run: migrate_sources,
        },
        Migrator {
            name: "legacy registry.toml -> root config",
            needs: legacy_registry_needs,
            run: migrate_legacy_registry,
        },
        Migrator {
            name: "absolute -> relative symlinks",
            needs: absolute_links_need,
            run: migrate_absolute_links,
        },
        Migrator {
            name: "hook.yaml -> hooks.json",
            needs: hooks_need,
            run: migrate_hooks,
        },
        Migrator {
            name: "plugin cache -> store",
            needs: plugin_cache_needs,
            run: migrate_plugin_cache,
        },
    ]
}

/// Run every migrator in order; with `dry_run` only report what is pending.
pub fn run_all(paths: &CcpPaths, dry_run: bool) -> Result<()> {
    for migrator in all() {
        let pending = (migrator.needs)(paths)?;
        if !pending {
            continue;
        }
        if dry_run {
            println!("> Would migrate: {}", migrator.name);
            continue;
        }
        let count = (migrator.run)(paths)?;
        println!("Migrated: {} ({count} item(s))", migrator.name);
    }
    Ok(())
}

// --- 1. manifest yaml -> toml ----------------------------------------------

fn profile_dirs(paths: &CcpPaths) -> Result<Vec<PathBuf>> {
    let dir = paths.profiles_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .map(|n| n != crate::paths::SHARED_DIR_NAME)
                .unwrap_or(false)
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn manifests_need(paths: &CcpPaths) -> Result<bool> {
    Ok(profile_dirs(paths)?
        .iter()
        .any(|d| d.join(crate::paths::LEGACY_MANIFEST_FILE).is_file()))
}

fn migrate_manifests(paths: &CcpPaths) -> Result<usize> {
    let mut count = 0;
    for dir in profile_dirs(paths)? {
        let yaml_path = dir.join(crate::paths::LEGACY_MANIFEST_FILE);
        if !yaml_path.is_file() {
            continue;
        }
        let mut manifest = ProfileManifest::load(&yaml_path)?;
        manifest.version = MANIFEST_VERSION;
        manifest.save(&dir.join(crate::paths::MANIFEST_FILE))?;
        fs::rename(&yaml_path, yaml_path.with_extension("yaml.bak"))
            .with_context(|| format!("failed to back up {}", yaml_path.display()))?;
        count += 1;
    }
    Ok(count)
}

// --- 2. per-item source.yaml -> registry -----------------------------------

fn items_with_source_yaml(paths: &CcpPaths) -> Result<Vec<(HubItemType, String, PathBuf)>> {
    let mut found = Vec::new();
    for item_type in HubItemType::ALL {
        let dir = paths.hub_type_dir(item_type);
        if !dir.is_dir() {
            continue;
        }
        let mut entries: Vec<_> = fs::read_dir(&dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let marker = entry.path().join(LEGACY_SOURCE_FILE);
            if marker.is_file() {
                let entry_str = entry.file_name().to_string_lossy().to_string();
                if let Some(name) = hub::name_from_entry(item_type, &entry_str) {
                    found.push((item_type, name, marker));
                }
            }
        }
    }
    Ok(found)
}

fn sources_need(paths: &CcpPaths) -> Result<bool> {
    Ok(!items_with_source_yaml(paths)?.is_empty())
}

fn migrate_sources(paths: &CcpPaths) -> Result<usize> {
    let found = items_with_source_yaml(paths)?;
    if found.is_empty() {
        return Ok(0);
    }
    let mut config = RootConfig::load(paths)?;
    let mut count = 0;

    for (item_type, name, marker) in found {
        let legacy = Source::load_legacy(&marker)?;
        let id = format!("{}/{}", legacy.owner, legacy.repo);
        let url = legacy.url.clone().unwrap_or_else(|| match legacy.source_type {
            SourceType::Github => format!("https://github.com/{id}.git"),
            _ => String::new(),
        });

        config
            .sources
            .entry(id.clone())
            .or_insert_with(|| SourceEntry {
                registry: match legacy.source_type {
                    SourceType::Github => "github".to_string(),
                    SourceType::Plugin => "plugin".to_string(),
                    SourceType::Local => "local".to_string(),
                },
                provider: "git".to_string(),
                url,
                path: paths.source_dir(&id),
                reference: legacy.reference.clone(),
                commit: legacy.commit.clone(),
                installed: Vec::new(),
                updated: legacy.installed_at,
            });
        config.record_installed(&id, &item_key(item_type, &name));

        fs::rename(&marker, marker.with_extension("yaml.bak"))
            .with_context(|| format!("failed to back up {}", marker.display()))?;
        count += 1;
    }

    config.save(paths)?;
    Ok(count)
}

// --- 3. legacy registry.toml -> root config --------------------------------

#[derive(Debug, Default, Deserialize)]
struct LegacyRegistryFile {
    #[serde(default)]
    sources: std::collections::BTreeMap<String, SourceEntry>,
}

fn legacy_registry_path(paths: &CcpPaths) -> PathBuf {
    paths.root().join("registry.toml")
}

fn legacy_registry_needs(paths: &CcpPaths) -> Result<bool> {
    Ok(legacy_registry_path(paths).is_file())
}

fn migrate_legacy_registry(paths: &CcpPaths) -> Result<usize> {
    let path = legacy_registry_path(paths);
    if !path.is_file() {
        return Ok(0);
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let legacy: LegacyRegistryFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut config = RootConfig::load(paths)?;
    let mut count = 0;
    for (id, entry) in legacy.sources {
        if !config.sources.contains_key(&id) {
            config.sources.insert(id, entry);
            count += 1;
        }
    }
    config.save(paths)?;
    fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
    Ok(count)
}

// --- 4. absolute -> relative symlinks --------------------------------------

fn all_managed_links(paths: &CcpPaths) -> Result<Vec<PathBuf>> {
    let mut links = Vec::new();

    if paths.live_is_symlink() {
        links.push(paths.live_dir().to_path_buf());
    }

    for profile_dir in profile_dirs(paths)? {
        for entry in fs::read_dir(&profile_dir)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_symlink() {
                // Data-dir (and any other top-level) symlinks.
                links.push(path);
            } else if path.is_dir() {
                let is_type_dir = HubItemType::ALL.iter().any(|t| t.dir_name() == name);
                if !is_type_dir {
                    continue;
                }
                for sub in fs::read_dir(&path)?.filter_map(|e| e.ok()) {
                    if sub.path().is_symlink() {
                        links.push(sub.path());
                    }
                }
            }
        }
    }
    Ok(links)
}

fn absolute_links_need(paths: &CcpPaths) -> Result<bool> {
    for link in all_managed_links(paths)? {
        if fs::read_link(&link)?.is_absolute() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn migrate_absolute_links(paths: &CcpPaths) -> Result<usize> {
    let mut count = 0;
    for link in all_managed_links(paths)? {
        let stored = fs::read_link(&link)?;
        if !stored.is_absolute() {
            continue;
        }
        debug!(link = %link.display(), "rewriting absolute link");
        symlink::remove(&link)?;
        symlink::create(&link, &stored)?;
        count += 1;
    }
    Ok(count)
}

// --- 5. hook.yaml -> hooks.json --------------------------------------------

fn hook_items_with_yaml(paths: &CcpPaths) -> Result<Vec<PathBuf>> {
    let dir = paths.hub_type_dir(HubItemType::Hooks);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join(LEGACY_HOOK_FILE).is_file())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn hooks_need(paths: &CcpPaths) -> Result<bool> {
    Ok(!hook_items_with_yaml(paths)?.is_empty())
}

fn migrate_hooks(paths: &CcpPaths) -> Result<usize> {
    let mut count = 0;
    for item_dir in hook_items_with_yaml(paths)? {
        let yaml_path = item_dir.join(LEGACY_HOOK_FILE);
        let legacy = LegacyHook::load(&yaml_path)?;

        if !item_dir.join(HOOKS_FILE).exists() {
            if !legacy.inline {
                let script = item_dir.join(&legacy.command);
                if script.is_file() {
                    let dest = item_dir.join(SCRIPTS_DIR).join(&legacy.command);
                    fsutil::move_path(&script, &dest)?;
                }
            }
            legacy.to_hook_file(true).save(&item_dir.join(HOOKS_FILE))?;
        }

        fs::rename(&yaml_path, yaml_path.with_extension("yaml.bak"))
            .with_context(|| format!("failed to back up {}", yaml_path.display()))?;
        count += 1;
    }
    Ok(count)
}

// --- 6. plugin cache -> store ----------------------------------------------

fn plugin_cache_entries(paths: &CcpPaths) -> Result<Vec<(PathBuf, SharedPluginStoreItem)>> {
    let mut found = Vec::new();
    for profile_dir in profile_dirs(paths)? {
        let plugins = profile_dir.join("plugins");
        if !plugins.is_dir() {
            continue;
        }
        for item in SharedPluginStoreItem::ALL {
            let entry = plugins.join(item.entry_name());
            if entry.exists() && !entry.is_symlink() {
                found.push((entry, item));
            }
        }
    }
    Ok(found)
}

fn plugin_cache_needs(paths: &CcpPaths) -> Result<bool> {
    Ok(!plugin_cache_entries(paths)?.is_empty())
}

fn migrate_plugin_cache(paths: &CcpPaths) -> Result<usize> {
    let mut count = 0;
    for (entry, item) in plugin_cache_entries(paths)? {
        let store_path = paths.store_plugin_item(item);
        if store_path.exists() {
            // Another profile already contributed this artifact; the cache
            // is regenerable, so the duplicate just becomes a link.
            fsutil::remove_any(&entry)?;
        } else {
            fsutil::move_path(&entry, &store_path)?;
        }
        symlink::create(&entry, &store_path)?;
        count += 1;
    }
    Ok(count)
}
