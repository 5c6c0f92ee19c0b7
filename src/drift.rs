// drift.rs - Manifest-vs-disk comparison and reconciliation

use crate::hub;
use crate::manifest::ProfileManifest;
use crate::paths::{CcpPaths, HubItemType};
use crate::symlink;
use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    /// In manifest, absent from disk.
    Missing,
    /// Symlink on disk, not in manifest.
    Extra,
    /// Symlink whose resolved target does not exist.
    Broken,
    /// Symlink resolves, but not to the hub item the manifest names.
    Mismatched,
    /// In manifest, but the hub item itself is gone.
    HubMissing,
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriftKind::Missing => "missing",
            DriftKind::Extra => "extra",
            DriftKind::Broken => "broken",
            DriftKind::Mismatched => "mismatched",
            DriftKind::HubMissing => "hub-missing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct DriftItem {
    pub item_type: HubItemType,
    pub name: String,
    pub kind: DriftKind,
    pub expected: Option<PathBuf>,
    pub actual: Option<PathBuf>,
}

impl DriftItem {
    pub fn describe(&self) -> String {
        match self.kind {
            DriftKind::Missing => format!("{}/{}: link missing", self.item_type, self.name),
            DriftKind::Extra => format!("{}/{}: link not in manifest", self.item_type, self.name),
            DriftKind::Broken => format!(
                "{}/{}: broken link (target {})",
                self.item_type,
                self.name,
                self.actual
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "?".to_string())
            ),
            DriftKind::Mismatched => format!(
                "{}/{}: points at {} instead of the hub item",
                self.item_type,
                self.name,
                self.actual
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "?".to_string())
            ),
            DriftKind::HubMissing => {
                format!("{}/{}: hub item does not exist", self.item_type, self.name)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DriftReport {
    pub profile: String,
    pub items: Vec<DriftItem>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        !self.items.is_empty()
    }
}

/// Compare a profile's manifest against its on-disk symlink graph.
pub fn detect(paths: &CcpPaths, profile: &str) -> Result<DriftReport> {
    let profile_dir = paths.profile_dir(profile);
    let manifest = ProfileManifest::load_from_dir(&profile_dir)?;

    let mut report = DriftReport {
        profile: profile.to_string(),
        items: Vec::new(),
    };

    for item_type in HubItemType::ALL {
        let expected = expected_items(&manifest, item_type);

        for name in &expected {
            let hub_path = hub::item_path(paths, item_type, name);
            let link = profile_dir
                .join(item_type.dir_name())
                .join(hub::entry_name(item_type, name));

            if !hub_path.exists() {
                report.items.push(DriftItem {
                    item_type,
                    name: name.clone(),
                    kind: DriftKind::HubMissing,
                    expected: Some(hub_path),
                    actual: None,
                });
                continue;
            }

            let info = symlink::info(&link);
            if !info.exists {
                report.items.push(DriftItem {
                    item_type,
                    name: name.clone(),
                    kind: DriftKind::Missing,
                    expected: Some(hub_path),
                    actual: None,
                });
                continue;
            }
            if !info.is_symlink {
                // A real file/dir shadowing a listed name is left to the
                // user; fix must never destroy non-symlink content.
                debug!(%item_type, %name, "listed entry is not a symlink; skipping");
                continue;
            }
            if info.is_broken {
                report.items.push(DriftItem {
                    item_type,
                    name: name.clone(),
                    kind: DriftKind::Broken,
                    expected: Some(hub_path),
                    actual: info.target,
                });
                continue;
            }
            if !symlink::validate(&link, &hub_path) {
                report.items.push(DriftItem {
                    item_type,
                    name: name.clone(),
                    kind: DriftKind::Mismatched,
                    expected: Some(hub_path),
                    actual: symlink::resolved_target(&link).ok(),
                });
            }
        }

        // Symlinks on disk that the manifest does not list.
        let type_dir = profile_dir.join(item_type.dir_name());
        if type_dir.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(&type_dir)
                .with_context(|| format!("failed to read {}", type_dir.display()))?
                .filter_map(|e| e.ok())
                .collect();
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                if !entry.path().is_symlink() {
                    continue;
                }
                let entry_str = entry.file_name().to_string_lossy().to_string();
                let Some(name) = hub::name_from_entry(item_type, &entry_str) else {
                    continue;
                };
                if !expected.iter().any(|n| *n == name) {
                    report.items.push(DriftItem {
                        item_type,
                        name,
                        kind: DriftKind::Extra,
                        expected: None,
                        actual: symlink::resolved_target(&entry.path()).ok(),
                    });
                }
            }
        }
    }

    Ok(report)
}

/// The names the detector expects on disk for one type. Hooks follow the
/// same legacy-list rule as the composer.
fn expected_items(manifest: &ProfileManifest, item_type: HubItemType) -> Vec<String> {
    if item_type == HubItemType::Hooks {
        manifest.hooks_for_compose().to_vec()
    } else {
        manifest.get_hub_items(item_type).to_vec()
    }
}

pub struct FixOptions<'a> {
    /// Drop hub-missing entries without asking.
    pub force: bool,
    /// Describe actions without touching disk.
    pub dry_run: bool,
    /// Per-item approval for dropping hub-missing entries; consulted only
    /// when `force` is unset.
    pub confirm_hub_missing: Option<&'a dyn Fn(&DriftItem) -> bool>,
}

impl Default for FixOptions<'_> {
    fn default() -> Self {
        FixOptions {
            force: false,
            dry_run: false,
            confirm_hub_missing: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct FixOutcome {
    /// Human-readable descriptions of what was (or would be) done.
    pub actions: Vec<String>,
    /// Hub-missing entries the user declined to drop.
    pub unresolved: usize,
}

/// Enact the minimum mutations that eliminate a drift report.
pub fn fix(
    paths: &CcpPaths,
    profile: &str,
    report: &DriftReport,
    opts: &FixOptions,
) -> Result<FixOutcome> {
    let profile_dir = paths.profile_dir(profile);
    let mut manifest = ProfileManifest::load_from_dir(&profile_dir)?;
    let mut manifest_changed = false;
    let mut settings_stale = false;
    let mut outcome = FixOutcome::default();

    for item in &report.items {
        let link = profile_dir
            .join(item.item_type.dir_name())
            .join(hub::entry_name(item.item_type, &item.name));
        let hub_path = hub::item_path(paths, item.item_type, &item.name);

        match item.kind {
            DriftKind::Missing => {
                outcome
                    .actions
                    .push(format!("create {}/{} link", item.item_type, item.name));
                if !opts.dry_run {
                    symlink::create(&link, &hub_path)?;
                }
            }
            DriftKind::Extra => {
                outcome
                    .actions
                    .push(format!("remove extra {}/{} link", item.item_type, item.name));
                if !opts.dry_run {
                    symlink::remove(&link)?;
                }
            }
            DriftKind::Broken | DriftKind::Mismatched => {
                outcome.actions.push(format!(
                    "relink {}/{} to the hub item",
                    item.item_type, item.name
                ));
                if !opts.dry_run {
                    symlink::remove(&link)?;
                    symlink::create(&link, &hub_path)?;
                }
            }
            DriftKind::HubMissing => {
                let approved = opts.force
                    || opts
                        .confirm_hub_missing
                        .map(|confirm| confirm(item))
                        .unwrap_or(false);
                if !approved {
                    outcome.unresolved += 1;
                    continue;
                }
                outcome.actions.push(format!(
                    "drop {}/{} from the manifest (hub item gone)",
                    item.item_type, item.name
                ));
                if !opts.dry_run {
                    manifest.remove_hub_item(item.item_type, &item.name);
                    if item.item_type == HubItemType::Hooks {
                        manifest.legacy_hooks.retain(|n| n != &item.name);
                    }
                    manifest_changed = true;
                    symlink::remove(&link)?;
                }
            }
        }

        if matches!(
            item.item_type,
            HubItemType::Hooks | HubItemType::SettingFragments
        ) {
            settings_stale = true;
        }
    }

    if opts.dry_run {
        return Ok(outcome);
    }

    if manifest_changed {
        manifest.save(&paths.profile_manifest(profile))?;
    }

    // Hook or fragment links changed; the composed settings must follow.
    if settings_stale {
        crate::composer::write_settings(paths, profile)?;
        outcome
            .actions
            .push(format!("recomposed settings for '{profile}'"));
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CcpPaths) {
        let tmp = TempDir::new().unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), tmp.path().join("claude"));
        (tmp, paths)
    }

    fn write_profile(paths: &CcpPaths, name: &str, manifest: &mut ProfileManifest) {
        fs::create_dir_all(paths.profile_dir(name)).unwrap();
        manifest.save(&paths.profile_manifest(name)).unwrap();
    }

    #[test]
    fn clean_profile_reports_nothing() {
        let (_tmp, paths) = setup();
        let hub_item = paths.hub_item(HubItemType::Skills, "foo");
        fs::create_dir_all(&hub_item).unwrap();

        let mut m = ProfileManifest::new("p", None);
        m.add_hub_item(HubItemType::Skills, "foo");
        write_profile(&paths, "p", &mut m);
        symlink::create(&paths.profile_link("p", HubItemType::Skills, "foo"), &hub_item).unwrap();

        let report = detect(&paths, "p").unwrap();
        assert!(!report.has_drift(), "unexpected: {:?}", report.items);
    }

    #[test]
    fn missing_and_extra_are_classified() {
        let (_tmp, paths) = setup();
        let foo = paths.hub_item(HubItemType::Skills, "foo");
        let bar = paths.hub_item(HubItemType::Skills, "bar");
        fs::create_dir_all(&foo).unwrap();
        fs::create_dir_all(&bar).unwrap();

        let mut m = ProfileManifest::new("p", None);
        m.add_hub_item(HubItemType::Skills, "foo");
        write_profile(&paths, "p", &mut m);
        // foo not linked; bar linked but unlisted
        symlink::create(&paths.profile_link("p", HubItemType::Skills, "bar"), &bar).unwrap();

        let report = detect(&paths, "p").unwrap();
        let kinds: Vec<_> = report.items.iter().map(|i| (i.name.as_str(), i.kind)).collect();
        assert!(kinds.contains(&("foo", DriftKind::Missing)));
        assert!(kinds.contains(&("bar", DriftKind::Extra)));
    }

    #[test]
    fn broken_link_is_fixed_and_converges() {
        let (tmp, paths) = setup();
        let foo = paths.hub_item(HubItemType::Skills, "foo");
        fs::create_dir_all(&foo).unwrap();

        let mut m = ProfileManifest::new("p", None);
        m.add_hub_item(HubItemType::Skills, "foo");
        write_profile(&paths, "p", &mut m);

        // Manually plant a link at the listed name pointing nowhere.
        let link = paths.profile_link("p", HubItemType::Skills, "foo");
        fs::create_dir_all(link.parent().unwrap()).unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(tmp.path().join("nonexistent"), &link).unwrap();

        let report = detect(&paths, "p").unwrap();
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].kind, DriftKind::Broken);

        fix(&paths, "p", &report, &FixOptions::default()).unwrap();

        let after = detect(&paths, "p").unwrap();
        assert!(!after.has_drift());
        assert!(symlink::validate(&link, &foo));
    }

    #[test]
    fn mismatched_link_is_repointed() {
        let (_tmp, paths) = setup();
        let foo = paths.hub_item(HubItemType::Skills, "foo");
        let other = paths.hub_item(HubItemType::Skills, "other");
        fs::create_dir_all(&foo).unwrap();
        fs::create_dir_all(&other).unwrap();

        let mut m = ProfileManifest::new("p", None);
        m.add_hub_item(HubItemType::Skills, "foo");
        write_profile(&paths, "p", &mut m);
        symlink::create(&paths.profile_link("p", HubItemType::Skills, "foo"), &other).unwrap();

        let report = detect(&paths, "p").unwrap();
        assert_eq!(report.items[0].kind, DriftKind::Mismatched);

        fix(&paths, "p", &report, &FixOptions::default()).unwrap();
        assert!(!detect(&paths, "p").unwrap().has_drift());
    }

    #[test]
    fn hub_missing_needs_approval() {
        let (_tmp, paths) = setup();
        let mut m = ProfileManifest::new("p", None);
        m.add_hub_item(HubItemType::Skills, "ghost");
        write_profile(&paths, "p", &mut m);

        let report = detect(&paths, "p").unwrap();
        assert_eq!(report.items[0].kind, DriftKind::HubMissing);

        // Declined: stays in manifest.
        let outcome = fix(&paths, "p", &report, &FixOptions::default()).unwrap();
        assert_eq!(outcome.unresolved, 1);
        let m = ProfileManifest::load_from_dir(&paths.profile_dir("p")).unwrap();
        assert!(m.references(HubItemType::Skills, "ghost"));

        // Forced: dropped.
        let outcome = fix(
            &paths,
            "p",
            &report,
            &FixOptions {
                force: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(outcome.unresolved, 0);
        let m = ProfileManifest::load_from_dir(&paths.profile_dir("p")).unwrap();
        assert!(!m.references(HubItemType::Skills, "ghost"));
    }

    #[test]
    fn dry_run_reports_without_touching_disk() {
        let (_tmp, paths) = setup();
        let foo = paths.hub_item(HubItemType::Skills, "foo");
        fs::create_dir_all(&foo).unwrap();

        let mut m = ProfileManifest::new("p", None);
        m.add_hub_item(HubItemType::Skills, "foo");
        write_profile(&paths, "p", &mut m);

        let report = detect(&paths, "p").unwrap();
        let outcome = fix(
            &paths,
            "p",
            &report,
            &FixOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(outcome.actions.len(), 1);
        assert!(!paths.profile_link("p", HubItemType::Skills, "foo").exists());
    }

    #[test]
    fn user_files_in_type_dirs_are_ignored() {
        let (_tmp, paths) = setup();
        let mut m = ProfileManifest::new("p", None);
        write_profile(&paths, "p", &mut m);

        let dir = paths.profile_type_dir("p", HubItemType::Rules);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("notes.md"), "mine").unwrap();

        let report = detect(&paths, "p").unwrap();
        assert!(!report.has_drift());
    }
}
