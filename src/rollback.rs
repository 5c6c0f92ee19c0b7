// rollback.rs - In-memory journal of reversible filesystem steps

use crate::error::CcpError;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One recorded mutation, stored with enough detail to invert it.
#[derive(Debug, Clone)]
pub enum Step {
    CreatedDir(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
    WroteFile(PathBuf),
    CreatedSymlink(PathBuf),
}

/// Journal of mutations for a single operation. Steps are undone in
/// reverse order on failure; the journal lives only in memory.
#[derive(Debug, Default)]
pub struct Journal {
    steps: Vec<Step>,
}

impl Journal {
    pub fn new() -> Self {
        Journal::default()
    }

    pub fn record(&mut self, step: Step) {
        debug!(?step, "journal");
        self.steps.push(step);
    }

    pub fn created_dir(&mut self, path: &Path) {
        self.record(Step::CreatedDir(path.to_path_buf()));
    }

    pub fn moved(&mut self, from: &Path, to: &Path) {
        self.record(Step::Moved {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
    }

    pub fn wrote_file(&mut self, path: &Path) {
        self.record(Step::WroteFile(path.to_path_buf()));
    }

    pub fn created_symlink(&mut self, path: &Path) {
        self.record(Step::CreatedSymlink(path.to_path_buf()));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Undo every recorded step, newest first. Collects undo failures
    /// instead of stopping so as much state as possible is restored;
    /// `cause` is the error that triggered the rollback.
    pub fn unwind(self, cause: &anyhow::Error) -> Result<()> {
        let mut undo_errors = Vec::new();
        for step in self.steps.into_iter().rev() {
            if let Err(e) = undo(&step) {
                undo_errors.push(format!("{step:?}: {e:#}"));
            }
        }
        if undo_errors.is_empty() {
            Ok(())
        } else {
            Err(CcpError::RollbackFailed {
                cause: format!("{cause:#}"),
                undo_errors,
            }
            .into())
        }
    }
}

fn undo(step: &Step) -> Result<()> {
    match step {
        // Only remove dirs we created and that are empty again; a non-empty
        // dir means a later inverse failed and its contents must survive.
        Step::CreatedDir(path) => match fs::remove_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        },
        Step::Moved { from, to } => crate::fsutil::move_path(to, from),
        Step::WroteFile(path) => crate::fsutil::remove_any(path),
        Step::CreatedSymlink(path) => crate::symlink::remove(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unwind_restores_moves_and_removes_writes() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("original.txt");
        fs::write(&original, "data").unwrap();

        let mut journal = Journal::new();

        let dir = tmp.path().join("created");
        fs::create_dir(&dir).unwrap();
        journal.created_dir(&dir);

        let moved_to = dir.join("moved.txt");
        crate::fsutil::move_path(&original, &moved_to).unwrap();
        journal.moved(&original, &moved_to);

        let written = tmp.path().join("written.txt");
        fs::write(&written, "new").unwrap();
        journal.wrote_file(&written);

        let err = anyhow::anyhow!("boom");
        journal.unwind(&err).unwrap();

        assert_eq!(fs::read_to_string(&original).unwrap(), "data");
        assert!(!written.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn unwind_removes_created_symlinks() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target");
        fs::create_dir(&target).unwrap();
        let link = tmp.path().join("link");
        crate::symlink::create(&link, &target).unwrap();

        let mut journal = Journal::new();
        journal.created_symlink(&link);
        journal.unwind(&anyhow::anyhow!("boom")).unwrap();

        assert!(!link.is_symlink());
        assert!(target.exists());
    }
}
