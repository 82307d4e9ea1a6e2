//! Custom error types for the snapshot rotator.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backup point {} is not mounted", .0.display())]
    Mount(PathBuf),

    #[error("Directory listing error on {host}: {message}")]
    Discovery { host: String, message: String },

    #[error("Rotation error at {}: {message}", path.display())]
    Rotation { path: PathBuf, message: String },

    #[error("rsync failed for {uri}: {message}")]
    Sync { uri: String, message: String },

    #[error("Could not read transfer size: {0}")]
    Parse(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    pub fn discovery(host: impl Into<String>, message: impl Into<String>) -> Self {
        BackupError::Discovery {
            host: host.into(),
            message: message.into(),
        }
    }

    pub fn rotation(path: &Path, message: impl Into<String>) -> Self {
        BackupError::Rotation {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn sync(uri: impl Into<String>, message: impl Into<String>) -> Self {
        BackupError::Sync {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Errors that only affect a single sync target; the job moves on to the next one.
    pub fn is_target_scoped(&self) -> bool {
        matches!(
            self,
            BackupError::Rotation { .. }
                | BackupError::Sync { .. }
                | BackupError::Parse(_)
                | BackupError::Io(_)
        )
    }
}

impl From<::config::ConfigError> for BackupError {
    fn from(value: ::config::ConfigError) -> Self {
        BackupError::Config(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
