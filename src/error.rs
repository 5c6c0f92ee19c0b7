// error.rs - Typed error taxonomy

use std::path::PathBuf;
use thiserror::Error;

/// Errors with a meaning the CLI cares about. Everything else travels as
/// plain anyhow context.
#[derive(Debug, Error)]
pub enum CcpError {
    #[error("ccp is not initialized (no root at {}); run `ccp init` first", root.display())]
    NotInitialized { root: PathBuf },

    #[error("{what} already exists")]
    AlreadyExists { what: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("failed to parse {}: {source}", path.display())]
    InvalidFormat {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{count} drift item(s) left unresolved (hub items missing; rerun with --force to drop them)")]
    DriftUnresolved { count: usize },

    #[error("{op} failed for {}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migration failed ({cause}) and rollback also failed: {}", undo_errors.join("; "))]
    RollbackFailed {
        cause: String,
        undo_errors: Vec<String>,
    },
}

impl CcpError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CcpError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CcpError::NotFound { what: what.into() }
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        CcpError::AlreadyExists { what: what.into() }
    }
}
