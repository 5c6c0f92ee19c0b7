// tests/compose.rs - Settings composition through a full migration

mod common;

use ccp::fsutil::home_prefixed;
use ccp::paths::HubItemType;
use common::TestEnv;
use std::fs;

#[test]
fn inside_hook_composes_through_the_profile_path() {
    let env = TestEnv::new();
    let script = env.live_file("hooks/s.sh", "#!/bin/sh\nexit 0\n");
    env.live_settings(&serde_json::json!({
        "hooks": {
            "SessionStart": [
                { "matcher": "startup", "hooks": [
                    { "type": "command", "command": script.display().to_string(), "timeout": 30 }
                ] }
            ]
        }
    }));

    env.init();
    let paths = env.paths();

    // The script moved into a hub hook item with scripts/ layout.
    let item = paths.hub_item(HubItemType::Hooks, "s");
    assert!(item.join("scripts/s.sh").is_file());

    let settings = env.profile_settings("default");
    let entry = &settings["hooks"]["SessionStart"][0];
    assert_eq!(entry["matcher"], "startup");
    assert_eq!(entry["hooks"][0]["timeout"], 30);

    // The command resolves through the profile's hook path, and following
    // it through the symlink reaches the real script.
    let command = entry["hooks"][0]["command"].as_str().unwrap();
    let profile_root = home_prefixed(&paths.profile_dir("default").join("hooks/s"));
    assert_eq!(command, format!("{profile_root}/scripts/s.sh"));
    assert!(paths
        .profile_dir("default")
        .join("hooks/s/scripts/s.sh")
        .exists());
}

#[test]
fn fragments_merge_and_hooks_stay_owned_by_the_composer() {
    let env = TestEnv::new();
    env.live_file("skills/foo/SKILL.md", "x");
    env.live_settings(&serde_json::json!({
        "permissions": { "allow": ["Bash"] },
        "apiProvider": "anthropic",
        "hooks": {}
    }));

    env.init();
    let paths = env.paths();

    // Both keys became fragments in the hub...
    let store = ccp::fragments::FragmentStore::new(&paths);
    let names = store.list().unwrap();
    assert!(names.contains(&"permissions".to_string()));
    assert!(names.contains(&"api-provider".to_string()));

    // ...and the composed settings carry them plus a composer-owned hooks
    // section.
    let settings = env.profile_settings("default");
    assert_eq!(settings["permissions"]["allow"][0], "Bash");
    assert_eq!(settings["apiProvider"], "anthropic");
    assert_eq!(settings["hooks"], serde_json::json!({}));
}

#[test]
fn inline_hooks_become_inline_hub_items() {
    let env = TestEnv::new();
    env.live_settings(&serde_json::json!({
        "hooks": {
            "Stop": [
                { "hooks": [ { "type": "command", "command": "echo done" } ] }
            ]
        }
    }));

    env.init();
    let paths = env.paths();

    assert!(ccp::hub::item_exists(&paths, HubItemType::Hooks, "inline-stop"));
    let settings = env.profile_settings("default");
    assert_eq!(settings["hooks"]["Stop"][0]["hooks"][0]["command"], "echo done");
}

#[test]
fn composer_is_idempotent_after_init() {
    let env = TestEnv::new();
    env.live_file("hooks/s.sh", "#!/bin/sh\n");
    env.live_settings(&serde_json::json!({
        "permissions": { "allow": ["Read"] },
        "hooks": {
            "Stop": [ { "hooks": [ { "type": "command", "command": "echo x" } ] } ]
        }
    }));
    env.init();
    let paths = env.paths();

    let first = fs::read(paths.profile_settings("default")).unwrap();
    ccp::composer::write_settings(&paths, "default").unwrap();
    let second = fs::read(paths.profile_settings("default")).unwrap();
    assert_eq!(first, second);
}
