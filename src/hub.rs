// hub.rs - Hub item enumeration and source provenance

use crate::paths::{CcpPaths, HubItemType};
use crate::registry::{RootConfig, SourceEntry};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const LEGACY_SOURCE_FILE: &str = "source.yaml";

/// The on-disk entry name for a hub item. Setting fragments are stored as
/// `{name}.yaml` files; every other type uses the name verbatim.
pub fn entry_name(item_type: HubItemType, name: &str) -> String {
    match item_type {
        HubItemType::SettingFragments => format!("{name}.yaml"),
        _ => name.to_string(),
    }
}

/// Inverse of [`entry_name`]: the logical item name for a directory entry.
pub fn name_from_entry(item_type: HubItemType, entry: &str) -> Option<String> {
    match item_type {
        HubItemType::SettingFragments => entry.strip_suffix(".yaml").map(str::to_string),
        _ => Some(entry.to_string()),
    }
}

/// "type/name" key used by the registry and the protection list.
pub fn item_key(item_type: HubItemType, name: &str) -> String {
    format!("{}/{}", item_type.dir_name(), name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Github,
    Plugin,
    Local,
}

/// Where a hub item came from, when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub owner: String,
    pub repo: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Source {
    pub fn from_registry(id: &str, entry: &SourceEntry) -> Self {
        let (owner, repo) = id.split_once('/').unwrap_or((id, ""));
        let source_type = match entry.registry.as_str() {
            "github" => SourceType::Github,
            "plugin" => SourceType::Plugin,
            _ if entry.provider == "git" => SourceType::Github,
            _ => SourceType::Local,
        };
        Source {
            source_type,
            owner: owner.to_string(),
            repo: repo.to_string(),
            reference: entry.reference.clone(),
            commit: entry.commit.clone(),
            url: Some(entry.url.clone()),
            installed_at: entry.updated,
            plugin_name: None,
            path: Some(entry.path.clone()),
        }
    }

    pub fn load_legacy(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Human-readable provenance for listings.
    pub fn source_info(&self) -> String {
        let id = if self.repo.is_empty() {
            self.owner.clone()
        } else {
            format!("{}/{}", self.owner, self.repo)
        };
        let mut out = match self.source_type {
            SourceType::Github => format!("github:{id}"),
            SourceType::Plugin => match &self.plugin_name {
                Some(p) => format!("plugin:{p} ({id})"),
                None => format!("plugin:{id}"),
            },
            SourceType::Local => format!("local:{id}"),
        };
        if let Some(r) = &self.reference {
            out.push('@');
            out.push_str(r);
        }
        if let Some(c) = &self.commit {
            let short = &c[..c.len().min(7)];
            out.push_str(&format!(" ({short})"));
        }
        out
    }

    /// True when the installer knows how to re-fetch this source.
    pub fn can_update(&self) -> bool {
        self.url.is_some()
    }
}

/// One scanned hub entry.
#[derive(Debug, Clone)]
pub struct HubItem {
    pub item_type: HubItemType,
    pub name: String,
    pub is_dir: bool,
    pub path: PathBuf,
    pub source: Option<Source>,
}

impl HubItem {
    pub fn key(&self) -> String {
        item_key(self.item_type, &self.name)
    }

    pub fn source_info(&self) -> String {
        match &self.source {
            Some(s) => s.source_info(),
            None => "local".to_string(),
        }
    }

    pub fn can_update(&self) -> bool {
        self.source.as_ref().is_some_and(Source::can_update)
    }
}

/// Enumerate every item under the hub, attaching provenance from the
/// registry first and falling back to a legacy `source.yaml` inside the
/// item directory.
pub fn scan(paths: &CcpPaths, config: &RootConfig) -> Result<Vec<HubItem>> {
    let mut items = Vec::new();
    for item_type in HubItemType::ALL {
        items.extend(scan_type(paths, config, item_type)?);
    }
    Ok(items)
}

/// Enumerate one hub type, sorted by name.
pub fn scan_type(
    paths: &CcpPaths,
    config: &RootConfig,
    item_type: HubItemType,
) -> Result<Vec<HubItem>> {
    let dir = paths.hub_type_dir(item_type);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut items = Vec::new();
    for entry in entries {
        let entry_str = entry.file_name().to_string_lossy().to_string();
        if entry_str.starts_with('.') {
            continue;
        }
        let Some(name) = name_from_entry(item_type, &entry_str) else {
            continue;
        };
        let path = entry.path();
        let is_dir = path.is_dir();

        let key = item_key(item_type, &name);
        let source = match config.source_of(&key) {
            Some((id, src)) => Some(Source::from_registry(id, src)),
            None => {
                let legacy = path.join(LEGACY_SOURCE_FILE);
                if is_dir && legacy.exists() {
                    Some(Source::load_legacy(&legacy)?)
                } else {
                    None
                }
            }
        };

        items.push(HubItem {
            item_type,
            name,
            is_dir,
            path,
            source,
        });
    }
    Ok(items)
}

/// Whether a hub item exists on disk.
pub fn item_exists(paths: &CcpPaths, item_type: HubItemType, name: &str) -> bool {
    paths
        .hub_item(item_type, &entry_name(item_type, name))
        .exists()
}

/// Absolute path of a hub item's on-disk entry.
pub fn item_path(paths: &CcpPaths, item_type: HubItemType, name: &str) -> PathBuf {
    paths.hub_item(item_type, &entry_name(item_type, name))
}
