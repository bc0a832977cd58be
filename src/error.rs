/*!
 * Error types for Steadfast
 */

use std::fmt;
use std::io;
use steadfast_core_config::ConfigError;
use steadfast_core_lock::LockError;
use steadfast_proto::ProtocolError;

pub type Result<T> = std::result::Result<T, SteadfastError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_DENIED: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_UNAVAILABLE: i32 = 3;

#[derive(Debug)]
pub enum SteadfastError {
    /// Channel framing or message error
    Protocol(ProtocolError),

    /// No usable configuration record
    ConfigUnavailable(String),

    /// A lock refused the requested change
    TransitionRejected(String),

    /// Evidence of an attempt to disable enforcement
    TamperSuspected(String),

    /// Settings or input error
    Config(String),

    /// Lock terms or lock record error
    Lock(LockError),

    /// I/O error
    Io(io::Error),

    /// JSON error
    Json(serde_json::Error),

    /// Another process is the authority
    AuthorityBusy { pid: u32 },

    /// Control socket exchange failed
    Control(String),
}

impl SteadfastError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SteadfastError::TransitionRejected(_) | SteadfastError::TamperSuspected(_) => {
                EXIT_DENIED
            }
            SteadfastError::ConfigUnavailable(_) | SteadfastError::AuthorityBusy { .. } => {
                EXIT_UNAVAILABLE
            }
            _ => EXIT_FATAL,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            SteadfastError::Protocol(_) | SteadfastError::Control(_) => ErrorCategory::Protocol,
            SteadfastError::ConfigUnavailable(_) | SteadfastError::AuthorityBusy { .. } => {
                ErrorCategory::Unavailable
            }
            SteadfastError::TransitionRejected(_) => ErrorCategory::Denied,
            SteadfastError::TamperSuspected(_) => ErrorCategory::Tamper,
            SteadfastError::Config(_) | SteadfastError::Lock(_) => ErrorCategory::Configuration,
            SteadfastError::Io(_) | SteadfastError::Json(_) => ErrorCategory::IoError,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Framing, message or control socket errors
    Protocol,
    /// Configuration store or authority not available
    Unavailable,
    /// Change refused by an active lock
    Denied,
    /// Tamper evidence
    Tamper,
    /// Bad settings, input or lock terms
    Configuration,
    /// I/O operation errors
    IoError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Unavailable => write!(f, "unavailable"),
            ErrorCategory::Denied => write!(f, "denied"),
            ErrorCategory::Tamper => write!(f, "tamper"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::IoError => write!(f, "io"),
        }
    }
}

impl fmt::Display for SteadfastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SteadfastError::Protocol(err) => write!(f, "Protocol error: {}", err),
            SteadfastError::ConfigUnavailable(msg) => {
                write!(f, "Configuration unavailable: {}", msg)
            }
            SteadfastError::TransitionRejected(reason) => write!(f, "Denied: {}", reason),
            SteadfastError::TamperSuspected(msg) => write!(f, "Tamper suspected: {}", msg),
            SteadfastError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SteadfastError::Lock(err) => write!(f, "Lock error: {}", err),
            SteadfastError::Io(err) => write!(f, "I/O error: {}", err),
            SteadfastError::Json(err) => write!(f, "JSON error: {}", err),
            SteadfastError::AuthorityBusy { pid } => {
                write!(f, "Authority is running as process {}", pid)
            }
            SteadfastError::Control(msg) => write!(f, "Control error: {}", msg),
        }
    }
}

impl std::error::Error for SteadfastError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SteadfastError::Protocol(err) => Some(err),
            SteadfastError::Lock(err) => Some(err),
            SteadfastError::Io(err) => Some(err),
            SteadfastError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SteadfastError {
    fn from(err: io::Error) -> Self {
        SteadfastError::Io(err)
    }
}

impl From<serde_json::Error> for SteadfastError {
    fn from(err: serde_json::Error) -> Self {
        SteadfastError::Json(err)
    }
}

impl From<ProtocolError> for SteadfastError {
    fn from(err: ProtocolError) -> Self {
        SteadfastError::Protocol(err)
    }
}

impl From<LockError> for SteadfastError {
    fn from(err: LockError) -> Self {
        SteadfastError::Lock(err)
    }
}

impl From<ConfigError> for SteadfastError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::LeaseHeld { pid } => SteadfastError::AuthorityBusy { pid },
            contended @ ConfigError::LeaseContended { .. } => {
                SteadfastError::ConfigUnavailable(contended.to_string())
            }
            ConfigError::Io(e) => SteadfastError::Io(e),
            ConfigError::Json(e) => SteadfastError::Json(e),
            corrupt @ ConfigError::Corrupt { .. } => {
                SteadfastError::ConfigUnavailable(corrupt.to_string())
            }
            other => SteadfastError::Config(other.to_string()),
        }
    }
}
