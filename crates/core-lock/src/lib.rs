//! Steadfast Core Lock: pure-logic commitment devices
//!
//! # Overview
//!
//! A lock is a restriction on undoing a restriction. While a lock is active the
//! authority refuses to loosen the block configuration until the lock's own
//! unlock predicate holds:
//!
//! - **Timer**: a fixed duration from activation has passed
//! - **RandomText**: the user types a generated secret exactly, within an attempt budget
//! - **Schedule**: no configured time-of-day window is currently active
//! - **Restart**: the governing process has been restarted N times since activation
//! - **Breakable**: a non-cancelable countdown, started on request, has run out
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Storage (the caller persists [`LockState`] after each mutation)
//! - Timers (the caller drives [`LockMachine::tick`] from its own interval)
//! - Presentation (events are returned, not displayed)
//!
//! Countdowns are stored as start instant plus total duration. Remaining time
//! is always derived, which is what makes locks survive process restarts.
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use steadfast_core_lock::{LockMachine, LockState, LockTerms, TimerLock, UnlockOutcome};
//!
//! let now = Utc::now();
//! let mut machine = LockMachine::new(LockState::unlocked());
//! machine.activate(LockTerms::Timer(TimerLock::new(3600)), now).unwrap();
//!
//! assert!(!machine.can_unlock(now + Duration::minutes(30), None));
//! assert!(matches!(
//!     machine.request_unlock(now + Duration::minutes(61), None),
//!     UnlockOutcome::Unlocked(_)
//! ));
//! ```

pub mod error;
pub mod machine;
pub mod protection;
pub mod schedule;
pub mod state;

pub use error::{LockError, Result};
pub use machine::{DenialReason, LockEvent, LockMachine, ResumeOutcome, UnlockOutcome};
pub use protection::{Capability, ProtectionLevel};
pub use schedule::{MinuteOfDay, ScheduleWindow, WeekdaySet};
pub use state::{
    ActiveLock, BreakableLock, LockKind, LockState, LockSummary, LockTerms, RandomTextLock,
    RestartLock, ScheduleLock, TimerLock,
};
