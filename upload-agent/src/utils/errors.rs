//! Error taxonomy for the upload agent.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    Glob { pattern: String, reason: String },

    #[error("I/O error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error for {key}: {message}")]
    Transport { key: String, message: String },

    #[error("Verification failed for {key}: {reason}")]
    Verification { key: String, reason: String },

    #[error("Manifest write failed: {0}")]
    Manifest(#[source] std::io::Error),
}

impl SyncError {
    /// Wrap an I/O error with the local path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transport(key: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Transport {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Errors that halt the run regardless of fail-fast.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_) | SyncError::Glob { .. } | SyncError::Manifest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::Config("missing bucket".into()).is_fatal());
        assert!(SyncError::Manifest(std::io::Error::other("disk full")).is_fatal());
        assert!(!SyncError::transport("a.csv", "503 Slow Down").is_fatal());
        assert!(!SyncError::io("/tmp/a.csv", std::io::Error::other("gone")).is_fatal());
        assert!(!SyncError::Verification {
            key: "a.csv".into(),
            reason: "size mismatch".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_display_includes_key() {
        let err = SyncError::transport("raw/a.csv", "connection reset");
        assert_eq!(
            err.to_string(),
            "Transport error for raw/a.csv: connection reset"
        );
    }
}
