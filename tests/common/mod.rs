// tests/common/mod.rs - Shared test harness: a fake home with a live dir
#![allow(dead_code)]

use ccp::paths::CcpPaths;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway root + live dir pair, with builders for seeding the live
/// dir the way a real assistant config dir looks.
pub struct TestEnv {
    pub root: PathBuf,
    pub live: PathBuf,
    _tmp: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        TestEnv {
            root: tmp.path().join("ccp"),
            live: tmp.path().join("claude"),
            _tmp: tmp,
        }
    }

    pub fn paths(&self) -> CcpPaths {
        CcpPaths::new(&self.root, &self.live)
    }

    /// Write a file under the live dir, creating parents.
    pub fn live_file(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.live.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn live_dir(&self, rel: &str) -> PathBuf {
        let path = self.live.join(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    /// Seed the live dir's settings.json.
    pub fn live_settings(&self, value: &serde_json::Value) {
        self.live_file(
            "settings.json",
            &(serde_json::to_string_pretty(value).unwrap() + "\n"),
        );
    }

    /// Run a full (non-dry) init over the current live dir.
    pub fn init(&self) {
        let opts = ccp::ops::init::InitOptions::default();
        let paths = self.paths();
        let plan = ccp::ops::init::plan(&paths, &opts).unwrap();
        ccp::ops::init::execute(&paths, &plan, &opts).unwrap();
    }

    /// Read the composed settings of a profile.
    pub fn profile_settings(&self, profile: &str) -> serde_json::Value {
        let content = fs::read_to_string(self.paths().profile_settings(profile)).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}

/// Assert that `link` is a symlink with a relative stored target resolving
/// to `target`.
pub fn assert_relative_link(link: &Path, target: &Path) {
    assert!(link.is_symlink(), "{} is not a symlink", link.display());
    let stored = fs::read_link(link).unwrap();
    assert!(
        stored.is_relative(),
        "{} stores an absolute target {}",
        link.display(),
        stored.display()
    );
    assert_eq!(
        fs::canonicalize(link).unwrap(),
        fs::canonicalize(target).unwrap(),
        "{} does not resolve to {}",
        link.display(),
        target.display()
    );
}
