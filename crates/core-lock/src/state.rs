//! Lock records and their variant-specific terms.
//!
//! Only start instants and total durations are persisted. Remaining time is
//! always derived from `now - start`, so a record written before a restart is
//! still exact after it.

use crate::error::{LockError, Result};
use crate::schedule::ScheduleWindow;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound for timer and breakable delays (one year)
pub const MAX_LOCK_SECS: u64 = 366 * 24 * 60 * 60;

/// Upper bound for generated RandomText secrets
pub const MAX_SECRET_LEN: usize = 4096;

/// Lock variant discriminator, as exposed in the published `lockType` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockKind {
    #[default]
    None,
    Timer,
    RandomText,
    Schedule,
    Restart,
    Breakable,
}

impl LockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::None => "none",
            LockKind::Timer => "timer",
            LockKind::RandomText => "randomText",
            LockKind::Schedule => "schedule",
            LockKind::Restart => "restart",
            LockKind::Breakable => "breakable",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted commitment record. No active lock means unlocked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    #[serde(default)]
    active: Option<ActiveLock>,
}

impl LockState {
    pub fn unlocked() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.active.is_some()
    }

    pub fn kind(&self) -> LockKind {
        self.active
            .as_ref()
            .map(|lock| lock.terms.kind())
            .unwrap_or(LockKind::None)
    }

    pub fn active(&self) -> Option<&ActiveLock> {
        self.active.as_ref()
    }

    pub(crate) fn active_mut(&mut self) -> Option<&mut ActiveLock> {
        self.active.as_mut()
    }

    pub(crate) fn set(&mut self, lock: ActiveLock) {
        self.active = Some(lock);
    }

    pub(crate) fn clear(&mut self) -> Option<ActiveLock> {
        self.active.take()
    }

    /// Consumer-facing summary, as embedded in the published configuration
    pub fn summary(&self, now: DateTime<Utc>) -> LockSummary {
        let Some(lock) = &self.active else {
            return LockSummary::default();
        };

        let timer_expiry = match &lock.terms {
            LockTerms::Timer(timer) => Some(timer.unlock_at(lock.created_at)),
            LockTerms::Breakable(b) if b.countdown_active() => b.ready_at(),
            _ => None,
        };

        LockSummary {
            is_locked: true,
            lock_type: lock.terms.kind(),
            timer_expiry,
            remaining_secs: lock.remaining(now).map(|d| d.num_seconds()),
        }
    }
}

/// An active lock: when it was created and what it takes to undo it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLock {
    pub created_at: DateTime<Utc>,
    pub terms: LockTerms,
}

impl ActiveLock {
    /// Remaining time for time-based variants (Timer, running Breakable countdown)
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match &self.terms {
            LockTerms::Timer(timer) => Some(timer.remaining(self.created_at, now)),
            LockTerms::Breakable(b) if b.countdown_active() => Some(b.remaining_delay(now)),
            _ => None,
        }
    }
}

/// Variant-specific terms of a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "camelCase")]
pub enum LockTerms {
    Timer(TimerLock),
    RandomText(RandomTextLock),
    Schedule(ScheduleLock),
    Restart(RestartLock),
    Breakable(BreakableLock),
}

impl LockTerms {
    pub fn kind(&self) -> LockKind {
        match self {
            LockTerms::Timer(_) => LockKind::Timer,
            LockTerms::RandomText(_) => LockKind::RandomText,
            LockTerms::Schedule(_) => LockKind::Schedule,
            LockTerms::Restart(_) => LockKind::Restart,
            LockTerms::Breakable(_) => LockKind::Breakable,
        }
    }

    /// Check terms are well-formed for a freshly activated lock
    pub fn validate(&self) -> Result<()> {
        match self {
            LockTerms::Timer(timer) => validate_delay("timer duration", timer.duration_secs),
            LockTerms::RandomText(text) => {
                if text.secret.is_empty() {
                    return Err(LockError::invalid_terms("random text secret is empty"));
                }
                if text.max_attempts == 0 {
                    return Err(LockError::invalid_terms("max attempts must be at least 1"));
                }
                if text.attempt_count != 0 {
                    return Err(LockError::invalid_terms(
                        "a new random text lock must start with zero attempts",
                    ));
                }
                Ok(())
            }
            LockTerms::Schedule(schedule) => {
                if schedule.windows.is_empty() {
                    return Err(LockError::invalid_terms("schedule has no windows"));
                }
                schedule.windows.iter().try_for_each(ScheduleWindow::validate)
            }
            LockTerms::Restart(restart) => {
                if restart.restarts_required == 0 {
                    return Err(LockError::invalid_terms(
                        "restart lock needs at least one restart",
                    ));
                }
                if restart.restarts_remaining != restart.restarts_required
                    || restart.last_counted_start.is_some()
                {
                    return Err(LockError::invalid_terms(
                        "a new restart lock must not have counted restarts",
                    ));
                }
                Ok(())
            }
            LockTerms::Breakable(b) => {
                validate_delay("breakable delay", b.total_delay_secs)?;
                if b.countdown_started_at.is_some() || b.ready_to_unlock {
                    return Err(LockError::invalid_terms(
                        "a new breakable lock must not have a running countdown",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn validate_delay(what: &str, secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(LockError::invalid_terms(format!("{} must be positive", what)));
    }
    if secs > MAX_LOCK_SECS {
        return Err(LockError::invalid_terms(format!(
            "{} of {}s exceeds the maximum of {}s",
            what, secs, MAX_LOCK_SECS
        )));
    }
    Ok(())
}

fn elapsed_since(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - start).max(Duration::zero())
}

/// Unlockable once `created_at + duration` has passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerLock {
    pub duration_secs: u64,
}

impl TimerLock {
    pub fn new(duration_secs: u64) -> Self {
        Self { duration_secs }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs.min(MAX_LOCK_SECS) as i64)
    }

    pub fn unlock_at(&self, started_at: DateTime<Utc>) -> DateTime<Utc> {
        started_at + self.duration()
    }

    /// Remaining time, never negative and never above the full duration
    pub fn remaining(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (self.duration() - elapsed_since(started_at, now)).max(Duration::zero())
    }
}

/// Unlockable by typing a generated secret exactly, within an attempt budget
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomTextLock {
    pub secret: String,
    pub attempt_count: u32,
    pub max_attempts: u32,
}

impl RandomTextLock {
    /// Generate a random alphanumeric secret of `length` characters
    pub fn generate(length: usize, max_attempts: u32) -> Result<Self> {
        if length == 0 || length > MAX_SECRET_LEN {
            return Err(LockError::invalid_terms(format!(
                "secret length must be between 1 and {}",
                MAX_SECRET_LEN
            )));
        }
        let secret: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
        Ok(Self::with_secret(secret, max_attempts))
    }

    pub fn with_secret(secret: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            secret: secret.into(),
            attempt_count: 0,
            max_attempts,
        }
    }

    pub fn attempts_left(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt_count)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Exact, case-sensitive comparison
    pub fn matches(&self, input: &str) -> bool {
        input == self.secret
    }
}

// Keep the secret out of logs
impl fmt::Debug for RandomTextLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomTextLock")
            .field("secret_len", &self.secret.len())
            .field("attempt_count", &self.attempt_count)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Unlockable whenever no configured window is active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleLock {
    pub windows: Vec<ScheduleWindow>,
}

impl ScheduleLock {
    pub fn new(windows: Vec<ScheduleWindow>) -> Self {
        Self { windows }
    }

    pub fn active_window(&self, local: &NaiveDateTime) -> Option<&ScheduleWindow> {
        self.windows.iter().find(|w| w.contains(local))
    }
}

/// Unlockable after the governing process has been started `restarts_required` times
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartLock {
    pub restarts_required: u32,
    pub restarts_remaining: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_counted_start: Option<DateTime<Utc>>,
}

impl RestartLock {
    pub fn new(restarts_required: u32) -> Self {
        Self {
            restarts_required,
            restarts_remaining: restarts_required,
            last_counted_start: None,
        }
    }

    /// Count a process start exactly once.
    ///
    /// Only starts later than the lock's creation and later than the last
    /// counted start decrement the counter.
    pub fn observe_start(&mut self, created_at: DateTime<Utc>, started_at: DateTime<Utc>) -> bool {
        if started_at <= created_at {
            return false;
        }
        if self
            .last_counted_start
            .is_some_and(|counted| started_at <= counted)
        {
            return false;
        }
        self.restarts_remaining = self.restarts_remaining.saturating_sub(1);
        self.last_counted_start = Some(started_at);
        true
    }
}

/// Unlockable after a non-cancelable countdown, started on request, has run out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakableLock {
    pub total_delay_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ready_to_unlock: bool,
}

impl BreakableLock {
    pub fn new(total_delay_secs: u64) -> Self {
        Self {
            total_delay_secs,
            countdown_started_at: None,
            ready_to_unlock: false,
        }
    }

    pub fn total_delay(&self) -> Duration {
        Duration::seconds(self.total_delay_secs.min(MAX_LOCK_SECS) as i64)
    }

    pub fn countdown_active(&self) -> bool {
        self.countdown_started_at.is_some() && !self.ready_to_unlock
    }

    /// Instant at which the countdown completes, if it was started
    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.countdown_started_at
            .map(|started| started + self.total_delay())
    }

    /// Remaining countdown: the full delay before it starts, zero once ready
    pub fn remaining_delay(&self, now: DateTime<Utc>) -> Duration {
        if self.ready_to_unlock {
            return Duration::zero();
        }
        match self.countdown_started_at {
            Some(started) => {
                (self.total_delay() - elapsed_since(started, now)).max(Duration::zero())
            }
            None => self.total_delay(),
        }
    }
}

/// Published view of the lock: `{isLocked, lockType, timerExpiry?}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSummary {
    pub is_locked: bool,
    pub lock_type: LockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<i64>,
}
