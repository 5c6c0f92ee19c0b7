// composer.rs - Build a profile's settings.json from fragments + hook items

use crate::fragments::FragmentStore;
use crate::fsutil::home_prefixed;
use crate::hooks::{self, resolve_command};
use crate::hub;
use crate::manifest::ProfileManifest;
use crate::paths::{CcpPaths, HubItemType};
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

/// Compose the settings value for a profile: fragments first (later ones
/// win), then the hooks section built from the profile's hook items.
pub fn compose(paths: &CcpPaths, profile: &str) -> Result<Value> {
    let profile_dir = paths.profile_dir(profile);
    let manifest = ProfileManifest::load_from_dir(&profile_dir)?;

    let mut settings: Map<String, Value> = Map::new();

    let store = FragmentStore::new(paths);
    for name in manifest.get_hub_items(HubItemType::SettingFragments) {
        if !store.exists(name) {
            eprintln!("Warning: setting fragment '{name}' not found in hub, skipping");
            continue;
        }
        let fragment = store.load(name)?;
        debug!(fragment = %name, key = %fragment.key, "applying fragment");
        settings.insert(fragment.key, fragment.value);
    }

    // The hooks section is owned by the composer; a fragment named "hooks"
    // is overwritten here.
    let composed = compose_hooks(paths, profile, &manifest)?;
    settings.insert("hooks".to_string(), Value::Object(composed));

    Ok(Value::Object(settings))
}

fn compose_hooks(
    paths: &CcpPaths,
    profile: &str,
    manifest: &ProfileManifest,
) -> Result<Map<String, Value>> {
    let mut composed: Map<String, Value> = Map::new();

    for hook_name in manifest.hooks_for_compose() {
        let item_dir = hub::item_path(paths, HubItemType::Hooks, hook_name);
        if !item_dir.is_dir() {
            eprintln!("Warning: hook item '{hook_name}' not found in hub, skipping");
            continue;
        }
        let hook_file = hooks::load_hook_item(&item_dir)
            .with_context(|| format!("failed to load hook item '{hook_name}'"))?;

        // Commands resolve through the profile's own hook path so the
        // written settings survive profile switches and resets.
        let plugin_root = home_prefixed(
            &paths
                .profile_dir(profile)
                .join(HubItemType::Hooks.dir_name())
                .join(hook_name),
        );

        for event in hook_file.events() {
            let mut groups = hook_file.groups(&event)?;
            for group in &mut groups {
                for entry in &mut group.hooks {
                    entry.command = resolve_command(&entry.command, &plugin_root);
                }
            }

            let slot = composed
                .entry(event)
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(arr) = slot.as_array_mut() {
                for group in groups {
                    arr.push(serde_json::to_value(group)?);
                }
            }
        }
    }

    Ok(composed)
}

/// Compose and atomically write `settings.json` inside the profile.
pub fn write_settings(paths: &CcpPaths, profile: &str) -> Result<()> {
    let settings = compose(paths, profile)?;
    crate::fsutil::atomic_write_json(&paths.profile_settings(profile), &settings)
}
