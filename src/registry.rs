// registry.rs - Root config (ccp.toml): registry settings + installed sources

use crate::error::CcpError;
use crate::paths::CcpPaths;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn default_registry() -> String {
    "skills.sh".to_string()
}

fn default_topics() -> Vec<String> {
    vec!["agent-skills".to_string()]
}

fn default_per_page() -> u32 {
    10
}

fn default_base_url() -> String {
    "https://skills.sh".to_string()
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubRegistryConfig {
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for GithubRegistryConfig {
    fn default() -> Self {
        GithubRegistryConfig {
            topics: default_topics(),
            per_page: default_per_page(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillsShConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for SkillsShConfig {
    fn default() -> Self {
        SkillsShConfig {
            base_url: default_base_url(),
            limit: default_limit(),
        }
    }
}

/// One installed external source, keyed by its id (e.g. "owner/repo").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub registry: String,
    pub provider: String,
    pub url: String,
    /// Local cache of the fetched source.
    pub path: PathBuf,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// "type/name" keys of hub items installed from this source.
    #[serde(default)]
    pub installed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootConfig {
    #[serde(default = "default_registry")]
    pub default_registry: String,
    #[serde(default)]
    pub github: GithubRegistryConfig,
    #[serde(default)]
    pub skillssh: SkillsShConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceEntry>,
}

impl Default for RootConfig {
    fn default() -> Self {
        RootConfig {
            default_registry: default_registry(),
            github: GithubRegistryConfig::default(),
            skillssh: SkillsShConfig::default(),
            sources: BTreeMap::new(),
        }
    }
}

impl RootConfig {
    /// Load the root config, or defaults when the file does not exist yet.
    pub fn load(paths: &CcpPaths) -> Result<Self> {
        let path = paths.root_config();
        if !path.exists() {
            return Ok(RootConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).map_err(|e| {
            CcpError::InvalidFormat {
                path,
                source: e.into(),
            }
            .into()
        })
    }

    pub fn save(&self, paths: &CcpPaths) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("failed to serialize root config")?;
        crate::fsutil::atomic_write(&paths.root_config(), &content)
    }

    /// The source (if any) whose `installed` list contains `type/name`.
    pub fn source_of(&self, item_key: &str) -> Option<(&str, &SourceEntry)> {
        self.sources
            .iter()
            .find(|(_, entry)| entry.installed.iter().any(|i| i == item_key))
            .map(|(id, entry)| (id.as_str(), entry))
    }

    /// Record an installed item under a source. Returns false if already
    /// recorded.
    pub fn record_installed(&mut self, source_id: &str, item_key: &str) -> bool {
        let Some(entry) = self.sources.get_mut(source_id) else {
            return false;
        };
        if entry.installed.iter().any(|i| i == item_key) {
            return false;
        }
        entry.installed.push(item_key.to_string());
        true
    }

    /// Drop an installed item from whatever source recorded it; empty
    /// sources are removed so the registry stays the single source of
    /// truth.
    pub fn forget_installed(&mut self, item_key: &str) -> bool {
        let mut changed = false;
        for entry in self.sources.values_mut() {
            let before = entry.installed.len();
            entry.installed.retain(|i| i != item_key);
            changed |= entry.installed.len() < before;
        }
        self.sources.retain(|_, entry| !entry.installed.is_empty());
        changed
    }

    /// Rename an installed item key everywhere (hub rename support).
    pub fn rename_installed(&mut self, old_key: &str, new_key: &str) {
        for entry in self.sources.values_mut() {
            for item in entry.installed.iter_mut() {
                if item == old_key {
                    *item = new_key.to_string();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_entry() -> SourceEntry {
        SourceEntry {
            registry: "github".to_string(),
            provider: "git".to_string(),
            url: "https://github.com/owner/repo.git".to_string(),
            path: PathBuf::from("/tmp/sources/owner--repo"),
            reference: Some("main".to_string()),
            commit: Some("abc123".to_string()),
            installed: vec!["skills/foo".to_string(), "agents/bar".to_string()],
            updated: None,
        }
    }

    #[test]
    fn round_trips_with_dotted_source_keys() {
        let mut config = RootConfig::default();
        config
            .sources
            .insert("owner/repo".to_string(), sample_entry());

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: RootConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(
            parsed.sources["owner/repo"].reference.as_deref(),
            Some("main")
        );
    }

    #[test]
    fn missing_file_loads_defaults() {
        let tmp = TempDir::new().unwrap();
        let paths = CcpPaths::new(tmp.path().join("ccp"), tmp.path().join("claude"));
        let config = RootConfig::load(&paths).unwrap();
        assert_eq!(config.default_registry, "skills.sh");
        assert_eq!(config.github.per_page, 10);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn source_of_finds_installed_items() {
        let mut config = RootConfig::default();
        config
            .sources
            .insert("owner/repo".to_string(), sample_entry());

        let (id, _) = config.source_of("skills/foo").unwrap();
        assert_eq!(id, "owner/repo");
        assert!(config.source_of("skills/unknown").is_none());
    }

    #[test]
    fn forget_installed_drops_empty_sources() {
        let mut config = RootConfig::default();
        config
            .sources
            .insert("owner/repo".to_string(), sample_entry());

        assert!(config.forget_installed("skills/foo"));
        assert!(config.sources.contains_key("owner/repo"));
        assert!(config.forget_installed("agents/bar"));
        assert!(!config.sources.contains_key("owner/repo"));
    }
}
