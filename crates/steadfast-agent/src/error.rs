//! Error types for the enforcement agent

use steadfast_core_config::ConfigError;
use steadfast_proto::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("storage error: {0}")]
    Config(#[from] ConfigError),

    #[error("surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a browser surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("page {0} no longer exists")]
    PageGone(u64),

    #[error("surface refused the operation: {0}")]
    Refused(String),
}
