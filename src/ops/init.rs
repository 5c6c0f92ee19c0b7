// ops/init.rs - One-shot migration of a live config dir into hub + profile

use crate::error::CcpError;
use crate::fragments::{extract_from_settings, Fragment, FragmentStore};
use crate::hooks::{HookEntry, HookFile, MatcherGroup, PLUGIN_ROOT_TOKEN, SCRIPTS_DIR};
use crate::hub;
use crate::manifest::ProfileManifest;
use crate::paths::{CcpPaths, DataItemType, HubItemType, ShareMode};
use crate::registry::RootConfig;
use crate::rollback::Journal;
use crate::{fsutil, symlink};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_PROFILE: &str = "default";

/// Config files copied (not interpreted) into the default profile.
const CONFIG_FILES: [&str; 3] = ["CLAUDE.md", "settings.json", "settings.local.json"];

/// Interpreters recognized in front of a hook script path.
const INTERPRETERS: [&str; 8] = [
    "bash", "sh", "zsh", "python", "python3", "node", "ruby", "perl",
];

/// What to do with hook scripts living outside the live dir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutsideHookPolicy {
    /// Copy the script into the hub item.
    Copy,
    /// Keep the absolute command unchanged.
    Keep,
    /// Drop the hook.
    Skip,
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub dry_run: bool,
    pub outside_hooks: OutsideHookPolicy,
    /// Extract non-hook top-level settings keys as fragments.
    pub extract_fragments: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        InitOptions {
            dry_run: false,
            outside_hooks: OutsideHookPolicy::Copy,
            extract_fragments: true,
        }
    }
}

/// A live-dir entry that becomes a hub item.
#[derive(Debug, Clone)]
pub struct PlannedItem {
    pub item_type: HubItemType,
    pub name: String,
    pub src: PathBuf,
}

/// Where a settings hook's command points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookLocation {
    /// Script under the live dir: moved into a hub item.
    Inside,
    /// Script elsewhere on disk: handled per policy.
    Outside,
    /// No file path at all: becomes an inline hub item.
    Inline,
}

/// One hook command pulled out of the existing settings file.
#[derive(Debug, Clone)]
pub struct PlannedHook {
    pub event: String,
    pub matcher: Option<String>,
    pub entry: HookEntry,
    pub location: HookLocation,
    /// Absolute script path for inside/outside hooks.
    pub script: Option<PathBuf>,
    pub interpreter: Option<String>,
    /// Derived hub item name.
    pub item_name: String,
}

#[derive(Debug, Default)]
pub struct MigrationPlan {
    pub hub_moves: Vec<PlannedItem>,
    pub config_files: Vec<String>,
    pub data_dirs: Vec<DataItemType>,
    pub hooks: Vec<PlannedHook>,
    pub fragments: Vec<Fragment>,
    pub leftovers: Vec<String>,
}

/// Build the migration plan without touching anything.
pub fn plan(paths: &CcpPaths, opts: &InitOptions) -> Result<MigrationPlan> {
    if paths.is_initialized() {
        return Err(CcpError::already_exists(format!(
            "ccp root {}",
            paths.root().display()
        ))
        .into());
    }
    if !paths.live_is_real_dir() {
        return Err(CcpError::not_found(format!(
            "live config directory {}",
            paths.live_dir().display()
        ))
        .into());
    }

    let live = paths.live_dir();
    let mut plan = MigrationPlan::default();

    // Typed items present in the live dir. Hooks are only planned here when
    // already item-shaped (a subdir carrying hooks.json/hook.yaml); loose
    // scripts are picked up through settings classification below.
    for item_type in HubItemType::ALL {
        if item_type == HubItemType::SettingFragments {
            continue;
        }
        let dir = live.join(item_type.dir_name());
        if !dir.is_dir() || dir.is_symlink() {
            continue;
        }
        let mut entries: Vec<_> = fs::read_dir(&dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let src = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if item_type == HubItemType::Hooks {
                let shaped = src.join(crate::hooks::HOOKS_FILE).exists()
                    || src.join(crate::hooks::LEGACY_HOOK_FILE).exists();
                if !shaped {
                    continue;
                }
            }
            plan.hub_moves.push(PlannedItem {
                item_type,
                name,
                src,
            });
        }
    }

    for file in CONFIG_FILES {
        if live.join(file).is_file() {
            plan.config_files.push(file.to_string());
        }
    }

    for data in DataItemType::ALL {
        if live.join(data.dir_name()).is_dir() {
            plan.data_dirs.push(data);
        }
    }

    // Hook extraction and fragment extraction from the old settings file.
    let settings_path = live.join("settings.json");
    if settings_path.is_file() {
        let content = fs::read_to_string(&settings_path)
            .with_context(|| format!("failed to read {}", settings_path.display()))?;
        let settings: Value = serde_json::from_str(&content).map_err(|e| CcpError::InvalidFormat {
            path: settings_path.clone(),
            source: e.into(),
        })?;

        let planned_hook_dirs: Vec<PathBuf> = plan
            .hub_moves
            .iter()
            .filter(|i| i.item_type == HubItemType::Hooks)
            .map(|i| i.src.clone())
            .collect();
        plan.hooks = classify_settings_hooks(live, &settings, &planned_hook_dirs);

        if opts.extract_fragments {
            plan.fragments = extract_from_settings(&settings);
        }
    }

    // Everything not otherwise claimed moves into the profile verbatim.
    let claimed: BTreeSet<String> = HubItemType::ALL
        .iter()
        .map(|t| t.dir_name().to_string())
        .chain(DataItemType::ALL.iter().map(|d| d.dir_name().to_string()))
        .chain(CONFIG_FILES.iter().map(|s| s.to_string()))
        .collect();
    let mut entries: Vec<_> = fs::read_dir(live)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if !claimed.contains(&name) {
            plan.leftovers.push(name);
        }
    }

    Ok(plan)
}

/// Print a plan the way `--dry-run` shows it.
pub fn print_plan(plan: &MigrationPlan) {
    println!("=== DRY RUN (no changes will be made) ===");
    println!();
    println!("Hub items to move:");
    for item in &plan.hub_moves {
        println!("  {}/{}  <- {}", item.item_type, item.name, item.src.display());
    }
    if !plan.hooks.is_empty() {
        println!("Hooks extracted from settings:");
        for hook in &plan.hooks {
            let loc = match hook.location {
                HookLocation::Inside => "inside",
                HookLocation::Outside => "outside",
                HookLocation::Inline => "inline",
            };
            println!("  hooks/{} ({}, event {})", hook.item_name, loc, hook.event);
        }
    }
    if !plan.fragments.is_empty() {
        let names: Vec<&str> = plan.fragments.iter().map(|f| f.name.as_str()).collect();
        println!("Setting fragments: {}", names.join(", "));
    }
    if !plan.data_dirs.is_empty() {
        let names: Vec<&str> = plan.data_dirs.iter().map(|d| d.dir_name()).collect();
        println!("Data dirs: {}", names.join(", "));
    }
    if !plan.config_files.is_empty() {
        println!("Config files: {}", plan.config_files.join(", "));
    }
    if !plan.leftovers.is_empty() {
        println!("Moved verbatim: {}", plan.leftovers.join(", "));
    }
}

/// Execute a migration plan. Every mutation is journaled; on failure the
/// journal is unwound in reverse before the original error surfaces.
pub fn execute(paths: &CcpPaths, plan: &MigrationPlan, opts: &InitOptions) -> Result<()> {
    let mut journal = Journal::new();
    match run_steps(paths, plan, opts, &mut journal) {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error during init, rolling back {} step(s)", journal.len());
            match journal.unwind(&e) {
                Ok(()) => Err(e),
                Err(rollback_err) => Err(rollback_err),
            }
        }
    }
}

fn run_steps(
    paths: &CcpPaths,
    plan: &MigrationPlan,
    opts: &InitOptions,
    journal: &mut Journal,
) -> Result<()> {
    let live = paths.live_dir().to_path_buf();

    // 1. Root structure.
    for dir in [
        paths.root().to_path_buf(),
        paths.hub_dir(),
        paths.profiles_dir(),
        paths.shared_dir(),
        paths.store_dir(),
        paths.sources_dir(),
    ] {
        create_dir_journaled(&dir, journal)?;
    }
    for item_type in HubItemType::ALL {
        create_dir_journaled(&paths.hub_type_dir(item_type), journal)?;
    }
    RootConfig::default().save(paths)?;
    journal.wrote_file(&paths.root_config());

    // 2. Move planned hub items.
    for item in &plan.hub_moves {
        let dest = hub::item_path(paths, item.item_type, &item.name);
        fsutil::move_path(&item.src, &dest)?;
        journal.moved(&item.src, &dest);
        println!("  Moved: {}/{}", item.item_type, item.name);
    }

    // 3. Default profile dir with the live dir's permission bits.
    let profile_dir = paths.profile_dir(DEFAULT_PROFILE);
    create_dir_journaled(&profile_dir, journal)?;
    fsutil::copy_permissions(&live, &profile_dir)?;

    // 4. Manifest referencing every moved item.
    let mut manifest = ProfileManifest::new(DEFAULT_PROFILE, None);
    for item in &plan.hub_moves {
        manifest.add_hub_item(item.item_type, &item.name);
    }
    manifest.save(&paths.profile_manifest(DEFAULT_PROFILE))?;
    journal.wrote_file(&paths.profile_manifest(DEFAULT_PROFILE));

    // 5. Profile type dirs + relative links into the hub.
    for item_type in HubItemType::ALL {
        create_dir_journaled(&paths.profile_type_dir(DEFAULT_PROFILE, item_type), journal)?;
    }
    for item in &plan.hub_moves {
        let link = profile_dir
            .join(item.item_type.dir_name())
            .join(hub::entry_name(item.item_type, &item.name));
        symlink::create(&link, &hub::item_path(paths, item.item_type, &item.name))?;
        journal.created_symlink(&link);
    }

    // 6. Copy recognized config files.
    for file in &plan.config_files {
        let dest = profile_dir.join(file);
        fsutil::copy_entry(&live.join(file), &dest, false)?;
        journal.wrote_file(&dest);
    }

    // 7. Data dirs: shared ones move under shared/, isolated ones into the
    // profile.
    for data in &plan.data_dirs {
        let src = live.join(data.dir_name());
        match manifest.get_data_share_mode(*data) {
            ShareMode::Shared => {
                let shared = paths.shared_data_dir(*data);
                fsutil::move_path(&src, &shared)?;
                journal.moved(&src, &shared);
                let link = paths.profile_data_dir(DEFAULT_PROFILE, *data);
                symlink::create(&link, &shared)?;
                journal.created_symlink(&link);
            }
            ShareMode::Isolated => {
                let dest = paths.profile_data_dir(DEFAULT_PROFILE, *data);
                fsutil::move_path(&src, &dest)?;
                journal.moved(&src, &dest);
            }
        }
    }

    // 8. Hook items extracted from settings.
    for hook in &plan.hooks {
        if !migrate_hook(paths, hook, opts, journal)? {
            continue;
        }
        manifest.add_hub_item(HubItemType::Hooks, &hook.item_name);
        let link = profile_dir
            .join(HubItemType::Hooks.dir_name())
            .join(&hook.item_name);
        symlink::create(&link, &hub::item_path(paths, HubItemType::Hooks, &hook.item_name))?;
        journal.created_symlink(&link);
        println!("  Hook: {} ({})", hook.item_name, hook.event);
    }

    // 9. Fragments from the old settings file.
    let store = FragmentStore::new(paths);
    for fragment in &plan.fragments {
        store.save(fragment)?;
        journal.wrote_file(&store.fragment_path(&fragment.name));
        manifest.add_hub_item(HubItemType::SettingFragments, &fragment.name);
        let link = profile_dir
            .join(HubItemType::SettingFragments.dir_name())
            .join(hub::entry_name(HubItemType::SettingFragments, &fragment.name));
        symlink::create(
            &link,
            &hub::item_path(paths, HubItemType::SettingFragments, &fragment.name),
        )?;
        journal.created_symlink(&link);
    }

    manifest.save(&paths.profile_manifest(DEFAULT_PROFILE))?;

    // 10. Remaining entries move into the profile verbatim. Names already
    // claimed (emptied type dirs, copied config files, moved data dirs)
    // stay behind and die with the live dir.
    let claimed: BTreeSet<String> = HubItemType::ALL
        .iter()
        .map(|t| t.dir_name().to_string())
        .chain(DataItemType::ALL.iter().map(|d| d.dir_name().to_string()))
        .chain(CONFIG_FILES.iter().map(|s| s.to_string()))
        .collect();
    let mut entries: Vec<_> = fs::read_dir(&live)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if claimed.contains(&name) {
            // Claimed type dirs may still hold stray entries (scripts the
            // settings never referenced); merge those into the profile
            // rather than letting them die with the live dir.
            let is_type_dir = HubItemType::ALL.iter().any(|t| t.dir_name() == name);
            if is_type_dir && entry.path().is_dir() && !entry.path().is_symlink() {
                let mut strays: Vec<_> = fs::read_dir(entry.path())?.filter_map(|e| e.ok()).collect();
                strays.sort_by_key(|e| e.file_name());
                for stray in strays {
                    let dest = profile_dir.join(&name).join(stray.file_name());
                    if dest.exists() || dest.is_symlink() {
                        continue;
                    }
                    fsutil::move_path(&stray.path(), &dest)?;
                    journal.moved(&stray.path(), &dest);
                }
            }
            continue;
        }
        let dest = profile_dir.join(&name);
        fsutil::move_path(&entry.path(), &dest)?;
        journal.moved(&entry.path(), &dest);
    }

    // 11. Compose the profile's settings.
    crate::composer::write_settings(paths, DEFAULT_PROFILE)?;

    // 12. Swap the live dir for a symlink into the profile. The original
    // is parked beside itself first so a failed swap rolls back cleanly.
    let parked = live.with_extension("ccp-migrated");
    fsutil::move_path(&live, &parked)?;
    journal.moved(&live, &parked);
    symlink::create(&live, &profile_dir)?;
    journal.created_symlink(&live);

    fsutil::remove_any(&parked)?;
    println!("Initialized: {} -> {}", live.display(), profile_dir.display());
    Ok(())
}

fn create_dir_journaled(dir: &Path, journal: &mut Journal) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    if let Some(parent) = dir.parent() {
        if !parent.exists() {
            create_dir_journaled(parent, journal)?;
        }
    }
    fs::create_dir(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    journal.created_dir(dir);
    Ok(())
}

/// Materialize one planned hook as a hub item. Returns false when the hook
/// is dropped (outside + skip policy).
fn migrate_hook(
    paths: &CcpPaths,
    hook: &PlannedHook,
    opts: &InitOptions,
    journal: &mut Journal,
) -> Result<bool> {
    let item_dir = hub::item_path(paths, HubItemType::Hooks, &hook.item_name);

    let command = match hook.location {
        HookLocation::Inline => hook.entry.command.clone(),
        HookLocation::Inside => {
            let script = hook.script.as_ref().expect("inside hook has a script");
            let file_name = script_file_name(script)?;
            let dest = item_dir.join(SCRIPTS_DIR).join(&file_name);
            create_dir_journaled(&item_dir.join(SCRIPTS_DIR), journal)?;
            fsutil::move_path(script, &dest)?;
            journal.moved(script, &dest);
            scripted_command(&hook.interpreter, &file_name)
        }
        HookLocation::Outside => match opts.outside_hooks {
            OutsideHookPolicy::Skip => {
                println!("  Skipped: outside hook {}", hook.entry.command);
                return Ok(false);
            }
            OutsideHookPolicy::Keep => hook.entry.command.clone(),
            OutsideHookPolicy::Copy => {
                let script = hook.script.as_ref().expect("outside hook has a script");
                let file_name = script_file_name(script)?;
                let dest = item_dir.join(SCRIPTS_DIR).join(&file_name);
                create_dir_journaled(&item_dir.join(SCRIPTS_DIR), journal)?;
                fsutil::copy_entry(script, &dest, true)?;
                journal.wrote_file(&dest);
                scripted_command(&hook.interpreter, &file_name)
            }
        },
    };

    create_dir_journaled(&item_dir, journal)?;

    let mut entry = hook.entry.clone();
    entry.command = command;
    let mut file = HookFile::default();
    file.push_group(
        &hook.event,
        MatcherGroup {
            matcher: hook.matcher.clone(),
            hooks: vec![entry],
        },
    );
    let hooks_path = item_dir.join(crate::hooks::HOOKS_FILE);
    file.save(&hooks_path)?;
    journal.wrote_file(&hooks_path);
    Ok(true)
}

fn script_file_name(script: &Path) -> Result<String> {
    script
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("hook script path {} has no file name", script.display()))
}

fn scripted_command(interpreter: &Option<String>, file_name: &str) -> String {
    let rel = format!("{PLUGIN_ROOT_TOKEN}/{SCRIPTS_DIR}/{file_name}");
    match interpreter {
        Some(i) => format!("{i} {rel}"),
        None => rel,
    }
}

/// Walk the settings hooks section and classify each command as inside,
/// outside, or inline.
fn classify_settings_hooks(
    live: &Path,
    settings: &Value,
    planned_hook_dirs: &[PathBuf],
) -> Vec<PlannedHook> {
    let Some(events) = settings.get("hooks").and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let mut planned = Vec::new();
    let mut used_names: BTreeSet<String> = BTreeSet::new();

    for (event, groups) in events {
        let Some(groups) = groups.as_array() else {
            continue;
        };
        for group in groups {
            let matcher = group
                .get("matcher")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let Some(entries) = group.get("hooks").and_then(|v| v.as_array()) else {
                continue;
            };
            for raw in entries {
                let Ok(entry) = serde_json::from_value::<HookEntry>(raw.clone()) else {
                    continue;
                };
                // Already item-relative: its hub item was planned directly.
                if entry.command.contains(PLUGIN_ROOT_TOKEN) {
                    continue;
                }

                let (interpreter, candidate, extra_args) = split_command(&entry.command);
                let resolved = candidate.as_deref().map(expand_home);

                let (location, script) = match resolved {
                    Some(path) if !extra_args && path.is_absolute() => {
                        if planned_hook_dirs.iter().any(|d| path.starts_with(d)) {
                            continue;
                        }
                        if path.starts_with(live) {
                            (HookLocation::Inside, Some(path))
                        } else {
                            (HookLocation::Outside, Some(path))
                        }
                    }
                    _ => (HookLocation::Inline, None),
                };

                let base = match (&script, location) {
                    (Some(path), _) => sanitize_name(
                        &path
                            .file_stem()
                            .map(|s| s.to_string_lossy().to_string())
                            .unwrap_or_else(|| "hook".to_string()),
                    ),
                    (None, _) => format!("inline-{}", sanitize_name(event)),
                };
                let item_name = unique_name(&base, &mut used_names);

                debug!(%event, %item_name, ?location, "classified hook");
                planned.push(PlannedHook {
                    event: event.clone(),
                    matcher: matcher.clone(),
                    entry,
                    location,
                    script,
                    interpreter,
                    item_name,
                });
            }
        }
    }
    planned
}

/// Split a command line into (interpreter, script candidate, has extra args).
fn split_command(command: &str) -> (Option<String>, Option<String>, bool) {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    match tokens.as_slice() {
        [] => (None, None, false),
        [single] => (None, Some((*single).to_string()), false),
        [first, second, rest @ ..] if INTERPRETERS.contains(first) => (
            Some((*first).to_string()),
            Some((*second).to_string()),
            !rest.is_empty(),
        ),
        [first, ..] => (None, Some((*first).to_string()), true),
    }
}

fn expand_home(path: &str) -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    if let Some(rest) = path.strip_prefix("~/") {
        home.join(rest)
    } else if let Some(rest) = path.strip_prefix("$HOME/") {
        home.join(rest)
    } else {
        PathBuf::from(path)
    }
}

fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            // Kebab word boundaries at case changes keep names readable.
            if c.is_ascii_uppercase() && !out.is_empty() && !last_dash {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "hook".to_string()
    } else {
        trimmed
    }
}

fn unique_name(base: &str, used: &mut BTreeSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut i = 2;
    loop {
        let candidate = format!("{base}-{i}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        i += 1;
    }
}
