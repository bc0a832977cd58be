//! Error types for lock operations

use crate::state::LockKind;
use thiserror::Error;

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors raised by the lock state machine.
///
/// A denied unlock is *not* an error: it is reported through
/// [`UnlockOutcome::Denied`](crate::UnlockOutcome::Denied).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// A lock is already active; only one lock may be held at a time
    #[error("a {kind} lock is already active")]
    AlreadyLocked { kind: LockKind },

    /// The operation needs an active lock
    #[error("no lock is active")]
    NotLocked,

    /// The operation only applies to a specific lock variant
    #[error("operation requires a {expected} lock, but the active lock is {actual}")]
    WrongVariant { expected: LockKind, actual: LockKind },

    /// Lock terms failed validation
    #[error("invalid lock terms: {0}")]
    InvalidTerms(String),

    /// A time-of-day value could not be parsed
    #[error("invalid time of day '{0}' (expected HH:MM)")]
    InvalidTime(String),

    /// A weekday value could not be parsed
    #[error("invalid weekday '{0}'")]
    InvalidWeekday(String),

    /// A protection level could not be parsed
    #[error("invalid protection level '{0}' (expected none, standard, strict or paranoid)")]
    InvalidProtectionLevel(String),
}

impl LockError {
    /// Create an invalid terms error
    pub fn invalid_terms<S: Into<String>>(message: S) -> Self {
        LockError::InvalidTerms(message.into())
    }
}
