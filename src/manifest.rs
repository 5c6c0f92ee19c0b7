// manifest.rs - Per-profile TOML manifest (YAML tolerated for migration)

use crate::error::CcpError;
use crate::paths::{DataItemType, HubItemType, ShareMode};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MANIFEST_VERSION: u32 = 2;

/// Ordered hub item names per type. Order is preserved as authored; the
/// composer iterates it as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubLinks {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default, rename = "setting-fragments")]
    pub setting_fragments: Vec<String>,
}

impl HubLinks {
    pub fn get(&self, item_type: HubItemType) -> &[String] {
        match item_type {
            HubItemType::Skills => &self.skills,
            HubItemType::Agents => &self.agents,
            HubItemType::Hooks => &self.hooks,
            HubItemType::Rules => &self.rules,
            HubItemType::Commands => &self.commands,
            HubItemType::SettingFragments => &self.setting_fragments,
        }
    }

    pub fn get_mut(&mut self, item_type: HubItemType) -> &mut Vec<String> {
        match item_type {
            HubItemType::Skills => &mut self.skills,
            HubItemType::Agents => &mut self.agents,
            HubItemType::Hooks => &mut self.hooks,
            HubItemType::Rules => &mut self.rules,
            HubItemType::Commands => &mut self.commands,
            HubItemType::SettingFragments => &mut self.setting_fragments,
        }
    }
}

fn shared() -> ShareMode {
    ShareMode::Shared
}

fn isolated() -> ShareMode {
    ShareMode::Isolated
}

/// Share mode per data dir, one field per [`DataItemType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "shared")]
    pub tasks: ShareMode,
    #[serde(default = "shared")]
    pub todos: ShareMode,
    #[serde(default = "isolated")]
    pub history: ShareMode,
    #[serde(default = "isolated")]
    pub projects: ShareMode,
    #[serde(default = "isolated", rename = "shell-snapshots")]
    pub shell_snapshots: ShareMode,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            tasks: DataItemType::Tasks.default_share_mode(),
            todos: DataItemType::Todos.default_share_mode(),
            history: DataItemType::History.default_share_mode(),
            projects: DataItemType::Projects.default_share_mode(),
            shell_snapshots: DataItemType::ShellSnapshots.default_share_mode(),
        }
    }
}

impl DataConfig {
    pub fn get(&self, data: DataItemType) -> ShareMode {
        match data {
            DataItemType::Tasks => self.tasks,
            DataItemType::Todos => self.todos,
            DataItemType::History => self.history,
            DataItemType::Projects => self.projects,
            DataItemType::ShellSnapshots => self.shell_snapshots,
        }
    }

    pub fn set(&mut self, data: DataItemType, mode: ShareMode) {
        match data {
            DataItemType::Tasks => self.tasks = mode,
            DataItemType::Todos => self.todos = mode,
            DataItemType::History => self.history = mode,
            DataItemType::Projects => self.projects = mode,
            DataItemType::ShellSnapshots => self.shell_snapshots = mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileManifest {
    pub version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub hub: HubLinks,
    #[serde(default)]
    pub data: DataConfig,
    /// Free-form hook list some pre-v2 manifests carry. Accepted on load,
    /// consulted only when `hub.hooks` is empty, never written back.
    #[serde(default, rename = "hooks", skip_serializing)]
    pub legacy_hooks: Vec<String>,
}

impl ProfileManifest {
    pub fn new(name: &str, description: Option<String>) -> Self {
        let now = Utc::now();
        ProfileManifest {
            version: MANIFEST_VERSION,
            name: name.to_string(),
            description,
            created: now,
            updated: now,
            hub: HubLinks::default(),
            data: DataConfig::default(),
            legacy_hooks: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let parsed = if path.extension().is_some_and(|e| e == "yaml") {
            serde_yaml::from_str(&content).map_err(anyhow::Error::from)
        } else {
            toml::from_str(&content).map_err(anyhow::Error::from)
        };
        parsed.map_err(|e| {
            CcpError::InvalidFormat {
                path: path.to_path_buf(),
                source: e,
            }
            .into()
        })
    }

    /// Load a profile's manifest from its directory: `profile.toml`
    /// preferred, `profile.yaml` tolerated until migrated.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let toml_path = dir.join(crate::paths::MANIFEST_FILE);
        if toml_path.exists() {
            return Self::load(&toml_path);
        }
        let yaml_path = dir.join(crate::paths::LEGACY_MANIFEST_FILE);
        if yaml_path.exists() {
            return Self::load(&yaml_path);
        }
        Err(CcpError::not_found(format!("manifest in {}", dir.display())).into())
    }

    /// Atomic write (tempfile + rename). Bumps `updated`.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated = Utc::now();
        let content = toml::to_string_pretty(self)
            .with_context(|| format!("failed to serialize manifest '{}'", self.name))?;
        crate::fsutil::atomic_write(path, &content)
    }

    pub fn get_hub_items(&self, item_type: HubItemType) -> &[String] {
        self.hub.get(item_type)
    }

    pub fn set_hub_items(&mut self, item_type: HubItemType, names: Vec<String>) {
        *self.hub.get_mut(item_type) = names;
    }

    /// Append a hub item if not present. Returns false if already listed.
    pub fn add_hub_item(&mut self, item_type: HubItemType, name: &str) -> bool {
        let items = self.hub.get_mut(item_type);
        if items.iter().any(|n| n == name) {
            return false;
        }
        items.push(name.to_string());
        true
    }

    /// Remove a hub item. Returns false if it was not listed.
    pub fn remove_hub_item(&mut self, item_type: HubItemType, name: &str) -> bool {
        let items = self.hub.get_mut(item_type);
        let before = items.len();
        items.retain(|n| n != name);
        items.len() < before
    }

    pub fn get_data_share_mode(&self, data: DataItemType) -> ShareMode {
        self.data.get(data)
    }

    pub fn set_data_share_mode(&mut self, data: DataItemType, mode: ShareMode) {
        self.data.set(data, mode);
    }

    /// The hook list the composer should walk. `hub.hooks` wins whenever it
    /// is populated; the legacy list only applies to old manifests that
    /// never gained hub links.
    pub fn hooks_for_compose(&self) -> &[String] {
        if !self.hub.hooks.is_empty() {
            &self.hub.hooks
        } else {
            &self.legacy_hooks
        }
    }

    /// True when any profile entry references `type/name`.
    pub fn references(&self, item_type: HubItemType, name: &str) -> bool {
        self.hub.get(item_type).iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_through_toml() {
        let mut m = ProfileManifest::new("default", Some("main profile".to_string()));
        m.add_hub_item(HubItemType::Skills, "foo");
        m.add_hub_item(HubItemType::Skills, "bar");
        m.add_hub_item(HubItemType::SettingFragments, "perms");
        m.set_data_share_mode(DataItemType::History, ShareMode::Shared);

        let serialized = toml::to_string_pretty(&m).unwrap();
        let parsed: ProfileManifest = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, m);
        // The kebab-case table key must be used, not the field identifier.
        assert!(serialized.contains("setting-fragments"));
    }

    #[test]
    fn save_bumps_updated_and_loads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("profile.toml");
        let mut m = ProfileManifest::new("work", None);
        let created = m.created;
        m.save(&path).unwrap();

        let loaded = ProfileManifest::load(&path).unwrap();
        assert_eq!(loaded.name, "work");
        assert_eq!(loaded.created, created);
        assert!(loaded.updated >= created);
    }

    #[test]
    fn order_within_type_is_preserved() {
        let mut m = ProfileManifest::new("p", None);
        m.set_hub_items(
            HubItemType::Hooks,
            vec!["z".to_string(), "a".to_string(), "m".to_string()],
        );
        let serialized = toml::to_string_pretty(&m).unwrap();
        let parsed: ProfileManifest = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.hub.hooks, vec!["z", "a", "m"]);
    }

    #[test]
    fn legacy_hooks_accepted_but_not_emitted() {
        let raw = r#"
version = 1
name = "old"
created = "2024-01-01T00:00:00Z"
updated = "2024-01-01T00:00:00Z"
hooks = ["legacy-hook"]
"#;
        let m: ProfileManifest = toml::from_str(raw).unwrap();
        assert_eq!(m.legacy_hooks, vec!["legacy-hook"]);
        assert_eq!(m.hooks_for_compose(), ["legacy-hook"]);

        let out = toml::to_string_pretty(&m).unwrap();
        assert!(!out.contains("legacy-hook"));
    }

    #[test]
    fn hub_hooks_win_over_legacy_list() {
        let mut m = ProfileManifest::new("p", None);
        m.legacy_hooks = vec!["old".to_string()];
        m.add_hub_item(HubItemType::Hooks, "new");
        assert_eq!(m.hooks_for_compose(), ["new"]);
    }

    #[test]
    fn yaml_manifest_is_tolerated() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let raw = r#"
version: 1
name: old
created: "2024-01-01T00:00:00Z"
updated: "2024-01-02T00:00:00Z"
hub:
  skills: [foo]
"#;
        std::fs::write(dir.join("profile.yaml"), raw).unwrap();
        let m = ProfileManifest::load_from_dir(dir).unwrap();
        assert_eq!(m.name, "old");
        assert_eq!(m.hub.skills, vec!["foo"]);
    }

    #[test]
    fn unknown_data_mode_defaults_apply() {
        let m = ProfileManifest::new("p", None);
        assert_eq!(m.get_data_share_mode(DataItemType::Tasks), ShareMode::Shared);
        assert_eq!(
            m.get_data_share_mode(DataItemType::Projects),
            ShareMode::Isolated
        );
    }
}
