// hooks.rs - The hooks.json shape and the legacy hook.yaml format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

pub const HOOKS_FILE: &str = "hooks.json";
pub const LEGACY_HOOK_FILE: &str = "hook.yaml";
pub const SCRIPTS_DIR: &str = "scripts";
pub const PLUGIN_ROOT_TOKEN: &str = "${CLAUDE_PLUGIN_ROOT}";

/// Event names the assistant currently emits. Unknown names pass through
/// untouched.
pub const KNOWN_EVENTS: [&str; 6] = [
    "SessionStart",
    "UserPromptSubmit",
    "PreToolUse",
    "PostToolUse",
    "Stop",
    "SubagentStop",
];

/// One command entry inside a matcher group. Unknown fields (e.g. `async`)
/// ride along in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HookEntry {
    pub fn command(command: impl Into<String>) -> Self {
        HookEntry {
            entry_type: "command".to_string(),
            command: command.into(),
            timeout: None,
            extra: Map::new(),
        }
    }
}

/// A matcher plus its command list, as the assistant's settings expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    pub hooks: Vec<HookEntry>,
}

/// `hooks.json` in a hook item directory. The event map keeps insertion
/// order and carries unknown event names verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookFile {
    pub hooks: Map<String, Value>,
}

impl HookFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::fsutil::atomic_write_json(path, &serde_json::to_value(self)?)
    }

    /// Parse one event's matcher groups.
    pub fn groups(&self, event: &str) -> Result<Vec<MatcherGroup>> {
        match self.hooks.get(event) {
            None => Ok(Vec::new()),
            Some(v) => serde_json::from_value(v.clone())
                .with_context(|| format!("malformed matcher groups for event '{event}'")),
        }
    }

    pub fn push_group(&mut self, event: &str, group: MatcherGroup) {
        let entry = self
            .hooks
            .entry(event.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(arr) = entry.as_array_mut() {
            arr.push(serde_json::to_value(group).expect("matcher group serializes"));
        }
    }

    /// Event names in file order.
    pub fn events(&self) -> Vec<String> {
        self.hooks.keys().cloned().collect()
    }
}

/// Load a hook item's definition: `hooks.json`, falling back to a legacy
/// `hook.yaml` that has not been migrated yet.
pub fn load_hook_item(item_dir: &Path) -> Result<HookFile> {
    let json_path = item_dir.join(HOOKS_FILE);
    if json_path.exists() {
        return HookFile::load(&json_path);
    }
    let yaml_path = item_dir.join(LEGACY_HOOK_FILE);
    if yaml_path.exists() {
        let legacy = LegacyHook::load(&yaml_path)?;
        // Un-migrated items keep their script at the item root.
        return Ok(legacy.to_hook_file(false));
    }
    anyhow::bail!(
        "hook item {} has neither {} nor {}",
        item_dir.display(),
        HOOKS_FILE,
        LEGACY_HOOK_FILE
    )
}

/// Substitute `${CLAUDE_PLUGIN_ROOT}` in a command with the hook item's
/// directory. Absolute and inline commands come back unchanged.
pub fn resolve_command(command: &str, plugin_root: &str) -> String {
    command.replace(PLUGIN_ROOT_TOKEN, plugin_root)
}

/// The single-event legacy format: one script (or inline command) per item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyHook {
    pub event: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub inline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl LegacyHook {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Render as the canonical shape. With `scripts_layout` the command
    /// points under `scripts/` (the migrated location); without it the
    /// script is addressed at the item root.
    pub fn to_hook_file(&self, scripts_layout: bool) -> HookFile {
        let command = if self.inline {
            self.command.clone()
        } else {
            let rel = if scripts_layout {
                format!("{PLUGIN_ROOT_TOKEN}/{SCRIPTS_DIR}/{}", self.command)
            } else {
                format!("{PLUGIN_ROOT_TOKEN}/{}", self.command)
            };
            match &self.interpreter {
                Some(interp) => format!("{interp} {rel}"),
                None => rel,
            }
        };

        let mut entry = HookEntry::command(command);
        entry.timeout = self.timeout;

        let mut file = HookFile::default();
        file.push_group(
            &self.event,
            MatcherGroup {
                matcher: self.matcher.clone(),
                hooks: vec![entry],
            },
        );
        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
  "hooks": {
    "SessionStart": [
      {
        "matcher": "startup",
        "hooks": [
          { "type": "command", "command": "${CLAUDE_PLUGIN_ROOT}/scripts/s.sh", "timeout": 30 }
        ]
      }
    ],
    "FutureEvent": [
      { "hooks": [ { "type": "command", "command": "echo hi" } ] }
    ]
  }
}"#
    }

    #[test]
    fn parses_known_and_unknown_events() {
        let file: HookFile = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(file.events(), vec!["SessionStart", "FutureEvent"]);

        let groups = file.groups("SessionStart").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].matcher.as_deref(), Some("startup"));
        assert_eq!(groups[0].hooks[0].timeout, Some(30));
    }

    #[test]
    fn unknown_events_round_trip() {
        let file: HookFile = serde_json::from_str(sample_json()).unwrap();
        let out = serde_json::to_value(&file).unwrap();
        assert!(out["hooks"]["FutureEvent"].is_array());
    }

    #[test]
    fn resolve_substitutes_plugin_root_only() {
        assert_eq!(
            resolve_command("${CLAUDE_PLUGIN_ROOT}/scripts/s.sh", "$HOME/.ccp/hub/hooks/h"),
            "$HOME/.ccp/hub/hooks/h/scripts/s.sh"
        );
        assert_eq!(resolve_command("/abs/path.sh", "$HOME/x"), "/abs/path.sh");
        assert_eq!(
            resolve_command("bash /x/y.sh", "$HOME/x"),
            "bash /x/y.sh"
        );
        assert_eq!(resolve_command("echo ok", "$HOME/x"), "echo ok");
    }

    #[test]
    fn legacy_hook_becomes_scripts_command() {
        let legacy = LegacyHook {
            event: "PreToolUse".to_string(),
            command: "check.sh".to_string(),
            interpreter: Some("bash".to_string()),
            inline: false,
            matcher: Some("Bash".to_string()),
            timeout: Some(10),
        };
        let file = legacy.to_hook_file(true);
        let groups = file.groups("PreToolUse").unwrap();
        assert_eq!(
            groups[0].hooks[0].command,
            "bash ${CLAUDE_PLUGIN_ROOT}/scripts/check.sh"
        );
        assert_eq!(groups[0].hooks[0].timeout, Some(10));
    }

    #[test]
    fn legacy_inline_passes_through() {
        let legacy = LegacyHook {
            event: "Stop".to_string(),
            command: "echo done".to_string(),
            interpreter: None,
            inline: true,
            matcher: None,
            timeout: None,
        };
        let file = legacy.to_hook_file(true);
        let groups = file.groups("Stop").unwrap();
        assert_eq!(groups[0].hooks[0].command, "echo done");
    }

    #[test]
    fn extra_entry_fields_survive() {
        let raw = r#"{ "hooks": { "Stop": [ { "hooks": [
            { "type": "command", "command": "x", "async": true } ] } ] } }"#;
        let file: HookFile = serde_json::from_str(raw).unwrap();
        let groups = file.groups("Stop").unwrap();
        assert_eq!(groups[0].hooks[0].extra.get("async"), Some(&Value::Bool(true)));
    }
}
