// paths.rs - Path resolver: every managed path derives from one root

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ROOT_CONFIG_FILE: &str = "ccp.toml";
pub const MANIFEST_FILE: &str = "profile.toml";
pub const LEGACY_MANIFEST_FILE: &str = "profile.yaml";
pub const SETTINGS_FILE: &str = "settings.json";
pub const PROTECTED_FILE: &str = ".protected";
pub const SHARED_DIR_NAME: &str = "shared";

/// The kinds of reusable items the hub holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HubItemType {
    Skills,
    Agents,
    Hooks,
    Rules,
    Commands,
    SettingFragments,
}

impl HubItemType {
    pub const ALL: [HubItemType; 6] = [
        HubItemType::Skills,
        HubItemType::Agents,
        HubItemType::Hooks,
        HubItemType::Rules,
        HubItemType::Commands,
        HubItemType::SettingFragments,
    ];

    /// Directory name under hub/ and under each profile.
    pub fn dir_name(self) -> &'static str {
        match self {
            HubItemType::Skills => "skills",
            HubItemType::Agents => "agents",
            HubItemType::Hooks => "hooks",
            HubItemType::Rules => "rules",
            HubItemType::Commands => "commands",
            HubItemType::SettingFragments => "setting-fragments",
        }
    }
}

impl fmt::Display for HubItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for HubItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HubItemType::ALL
            .into_iter()
            .find(|t| t.dir_name() == s)
            .ok_or_else(|| format!("unknown hub item type '{s}'"))
    }
}

/// Per-profile data directories that can be shared or isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataItemType {
    Tasks,
    Todos,
    History,
    Projects,
    ShellSnapshots,
}

impl DataItemType {
    pub const ALL: [DataItemType; 5] = [
        DataItemType::Tasks,
        DataItemType::Todos,
        DataItemType::History,
        DataItemType::Projects,
        DataItemType::ShellSnapshots,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            DataItemType::Tasks => "tasks",
            DataItemType::Todos => "todos",
            DataItemType::History => "history",
            DataItemType::Projects => "projects",
            DataItemType::ShellSnapshots => "shell-snapshots",
        }
    }

    /// How a fresh profile shares this data dir by default.
    pub fn default_share_mode(self) -> ShareMode {
        match self {
            DataItemType::Tasks | DataItemType::Todos => ShareMode::Shared,
            _ => ShareMode::Isolated,
        }
    }
}

impl fmt::Display for DataItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for DataItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataItemType::ALL
            .into_iter()
            .find(|t| t.dir_name() == s)
            .ok_or_else(|| format!("unknown data type '{s}'"))
    }
}

/// Whether a profile's data dir is a symlink into shared/ or its own directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareMode {
    Shared,
    Isolated,
}

/// Regenerable plugin artifacts relocated under store/plugins/.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedPluginStoreItem {
    Marketplaces,
    Cache,
    KnownMarketplaces,
}

impl SharedPluginStoreItem {
    pub const ALL: [SharedPluginStoreItem; 3] = [
        SharedPluginStoreItem::Marketplaces,
        SharedPluginStoreItem::Cache,
        SharedPluginStoreItem::KnownMarketplaces,
    ];

    pub fn entry_name(self) -> &'static str {
        match self {
            SharedPluginStoreItem::Marketplaces => "marketplaces",
            SharedPluginStoreItem::Cache => "cache",
            SharedPluginStoreItem::KnownMarketplaces => "known_marketplaces.json",
        }
    }
}

/// Resolves every path the system touches from the root dir and the live
/// config dir. Pure path arithmetic; only the predicates at the bottom
/// touch the filesystem.
#[derive(Debug, Clone)]
pub struct CcpPaths {
    root: PathBuf,
    live: PathBuf,
}

impl CcpPaths {
    pub fn new(root: impl Into<PathBuf>, live: impl Into<PathBuf>) -> Self {
        CcpPaths {
            root: root.into(),
            live: live.into(),
        }
    }

    /// Resolve from the environment: CCP_DIR / CLAUDE_CONFIG_DIR override
    /// the ~/.ccp and ~/.claude defaults.
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let root = std::env::var_os("CCP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".ccp"));
        let live = std::env::var_os("CLAUDE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".claude"));
        CcpPaths { root, live }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn live_dir(&self) -> &Path {
        &self.live
    }

    pub fn root_config(&self) -> PathBuf {
        self.root.join(ROOT_CONFIG_FILE)
    }

    pub fn hub_dir(&self) -> PathBuf {
        self.root.join("hub")
    }

    pub fn hub_type_dir(&self, item_type: HubItemType) -> PathBuf {
        self.hub_dir().join(item_type.dir_name())
    }

    pub fn hub_item(&self, item_type: HubItemType, name: &str) -> PathBuf {
        self.hub_type_dir(item_type).join(name)
    }

    pub fn protected_file(&self) -> PathBuf {
        self.hub_dir().join(PROTECTED_FILE)
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(name)
    }

    pub fn profile_manifest(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join(MANIFEST_FILE)
    }

    pub fn profile_legacy_manifest(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join(LEGACY_MANIFEST_FILE)
    }

    pub fn profile_settings(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join(SETTINGS_FILE)
    }

    pub fn profile_type_dir(&self, name: &str, item_type: HubItemType) -> PathBuf {
        self.profile_dir(name).join(item_type.dir_name())
    }

    pub fn profile_link(&self, profile: &str, item_type: HubItemType, name: &str) -> PathBuf {
        self.profile_type_dir(profile, item_type).join(name)
    }

    pub fn profile_data_dir(&self, profile: &str, data: DataItemType) -> PathBuf {
        self.profile_dir(profile).join(data.dir_name())
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.profiles_dir().join(SHARED_DIR_NAME)
    }

    pub fn shared_data_dir(&self, data: DataItemType) -> PathBuf {
        self.shared_dir().join(data.dir_name())
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.root.join("sources")
    }

    pub fn source_dir(&self, id: &str) -> PathBuf {
        // "owner/repo" ids become filesystem-safe "owner--repo" dirs
        self.sources_dir().join(id.replace('/', "--"))
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    pub fn store_plugins_dir(&self) -> PathBuf {
        self.store_dir().join("plugins")
    }

    pub fn store_plugin_item(&self, item: SharedPluginStoreItem) -> PathBuf {
        self.store_plugins_dir().join(item.entry_name())
    }

    // --- Predicates (the only I/O in this module) ---

    pub fn is_initialized(&self) -> bool {
        self.root.is_dir()
    }

    pub fn live_is_symlink(&self) -> bool {
        self.live.is_symlink()
    }

    pub fn live_is_real_dir(&self) -> bool {
        self.live.is_dir() && !self.live.is_symlink()
    }
}
