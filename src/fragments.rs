// fragments.rs - Named setting fragments persisted as YAML in the hub

use crate::error::CcpError;
use crate::paths::{CcpPaths, HubItemType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One reusable top-level settings entry: assigning `value` at `key` in the
/// composed settings JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub key: String,
    pub value: serde_json::Value,
}

/// Fragment names double as file names; keep them boring.
pub fn validate_name(name: &str) -> Result<(), CcpError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(CcpError::InvalidName {
            name: name.to_string(),
            reason: "fragment names may only contain [a-z0-9-]".to_string(),
        })
    }
}

/// camelCase / PascalCase -> kebab-case, used when extracting fragments
/// from an existing settings file.
pub fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '_' || c == ' ' {
            out.push('-');
        } else {
            out.push(c);
        }
    }
    out
}

/// Load/store fragments under `hub/setting-fragments/`.
pub struct FragmentStore<'a> {
    paths: &'a CcpPaths,
}

impl<'a> FragmentStore<'a> {
    pub fn new(paths: &'a CcpPaths) -> Self {
        FragmentStore { paths }
    }

    pub fn fragment_path(&self, name: &str) -> PathBuf {
        self.paths
            .hub_item(HubItemType::SettingFragments, &format!("{name}.yaml"))
    }

    pub fn save(&self, fragment: &Fragment) -> Result<()> {
        validate_name(&fragment.name)?;
        let content = serde_yaml::to_string(fragment)
            .with_context(|| format!("failed to serialize fragment '{}'", fragment.name))?;
        crate::fsutil::atomic_write(&self.fragment_path(&fragment.name), &content)
    }

    pub fn load(&self, name: &str) -> Result<Fragment> {
        let path = self.fragment_path(name);
        if !path.exists() {
            return Err(CcpError::not_found(format!("setting fragment '{name}'")).into());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&content).map_err(|e| {
            CcpError::InvalidFormat {
                path,
                source: e.into(),
            }
            .into()
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.fragment_path(name).exists()
    }

    /// All fragment names in the hub, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.paths.hub_type_dir(HubItemType::SettingFragments);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(stem) = file_name.strip_suffix(".yaml") {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Turn each top-level key of a settings file (except `hooks`, which the
/// composer owns) into a fragment.
pub fn extract_from_settings(settings: &serde_json::Value) -> Vec<Fragment> {
    let Some(obj) = settings.as_object() else {
        return Vec::new();
    };
    obj.iter()
        .filter(|(key, _)| key.as_str() != "hooks")
        .map(|(key, value)| Fragment {
            name: kebab_case(key),
            description: None,
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}
