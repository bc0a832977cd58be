//! Error types for configuration and liveness storage

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted file exists but cannot be parsed
    #[error("corrupt record at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Path has no parent directory to stage a temp file in
    #[error("invalid path: {path}")]
    InvalidPath { path: PathBuf },

    /// Domain could not be normalised
    #[error("invalid domain '{0}'")]
    InvalidDomain(String),

    /// Path prefix could not be normalised
    #[error("invalid path prefix '{0}'")]
    InvalidPathPrefix(String),

    /// Another live process holds the authority lease
    #[error("authority lease is held by process {pid}")]
    LeaseHeld { pid: u32 },

    /// Lease file exists but is unreadable and recent; someone is taking it
    #[error("authority lease at {path} is being taken by another process")]
    LeaseContended { path: PathBuf },

    /// The lease file no longer names this process
    #[error("authority lease at {path} is now held by {holder:?}")]
    LeaseLost { path: PathBuf, holder: Option<u32> },

    /// Publish attempted with a lease for a different state directory
    #[error("lease for {lease_dir} does not cover {store_dir}")]
    NotLeaseHolder {
        lease_dir: PathBuf,
        store_dir: PathBuf,
    },
}

impl ConfigError {
    pub fn corrupt<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        ConfigError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure means "no usable record right now" rather than a bug
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ConfigError::Io(_) | ConfigError::Corrupt { .. })
    }
}
