//! Lock state machine: activation, unlock predicates and countdown progression.
//!
//! The machine is pure logic. Every operation takes `now` explicitly; the
//! caller owns the timers that drive [`LockMachine::tick`] and persists
//! [`LockMachine::state`] after each mutation.

use crate::error::{LockError, Result};
use crate::schedule::MinuteOfDay;
use crate::state::{ActiveLock, LockKind, LockState, LockTerms};
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDateTime, Utc};
use std::fmt;
use tracing::{debug, info};

/// Result of an unlock request. Denial is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The predicate held and the lock was released
    Unlocked(LockKind),
    /// There was nothing to unlock
    AlreadyUnlocked,
    /// The predicate does not hold yet
    Denied(DenialReason),
}

impl UnlockOutcome {
    pub fn is_unlocked(&self) -> bool {
        matches!(
            self,
            UnlockOutcome::Unlocked(_) | UnlockOutcome::AlreadyUnlocked
        )
    }
}

/// Why an unlock request was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    TimerRunning { remaining_secs: i64 },
    InsideScheduleWindow { until: MinuteOfDay },
    RestartsRemaining { remaining: u32 },
    TextRequired,
    WrongText { attempts_left: u32 },
    AttemptsExhausted,
    CountdownNotStarted,
    CountdownRunning { remaining_secs: i64 },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::TimerRunning { remaining_secs } => {
                write!(f, "timer still running ({}s remaining)", remaining_secs)
            }
            DenialReason::InsideScheduleWindow { until } => {
                write!(f, "inside a scheduled block window until {}", until)
            }
            DenialReason::RestartsRemaining { remaining } => {
                write!(f, "{} restart(s) still required", remaining)
            }
            DenialReason::TextRequired => write!(f, "the unlock text is required"),
            DenialReason::WrongText { attempts_left } => {
                write!(f, "text does not match ({} attempt(s) left)", attempts_left)
            }
            DenialReason::AttemptsExhausted => write!(f, "no unlock attempts left"),
            DenialReason::CountdownNotStarted => {
                write!(f, "start the countdown before unlocking")
            }
            DenialReason::CountdownRunning { remaining_secs } => {
                write!(f, "countdown still running ({}s remaining)", remaining_secs)
            }
        }
    }
}

/// Transitions worth reporting to the notifier and the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    Activated(LockKind),
    TimerElapsed,
    CountdownStarted { remaining_secs: i64 },
    BreakableReady,
    RestartCounted { remaining: u32 },
    Unlocked(LockKind),
    Removed(LockKind),
}

/// Result of re-establishing in-flight countdowns after a process start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Nothing was counting down
    Idle,
    /// Countdown continues with the recomputed remaining time
    Resumed { remaining: Duration },
    /// The countdown ran out while the process was down
    Completed(LockEvent),
}

/// Owns one [`LockState`] and applies the variant rules to it.
#[derive(Debug, Clone)]
pub struct LockMachine {
    state: LockState,
    last_tick: Option<DateTime<Utc>>,
    utc_offset: Option<FixedOffset>,
}

impl LockMachine {
    pub fn new(state: LockState) -> Self {
        Self {
            state,
            last_tick: None,
            utc_offset: None,
        }
    }

    /// Evaluate schedule windows at a fixed UTC offset instead of the system zone
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = Some(offset);
        self
    }

    pub fn state(&self) -> &LockState {
        &self.state
    }

    pub fn into_state(self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }

    fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        match self.utc_offset {
            Some(offset) => now.with_timezone(&offset).naive_local(),
            None => now.with_timezone(&Local).naive_local(),
        }
    }

    /// Start a new lock. Fails if one is already active.
    pub fn activate(&mut self, terms: LockTerms, now: DateTime<Utc>) -> Result<LockEvent> {
        if let Some(active) = self.state.active() {
            return Err(LockError::AlreadyLocked {
                kind: active.terms.kind(),
            });
        }
        terms.validate()?;

        let kind = terms.kind();
        self.state.set(ActiveLock {
            created_at: now,
            terms,
        });
        self.last_tick = Some(now);
        info!(lock_type = %kind, "lock activated");
        Ok(LockEvent::Activated(kind))
    }

    /// Whether an unlock request would currently succeed. Pure: nothing is counted.
    pub fn can_unlock(&self, now: DateTime<Utc>, input: Option<&str>) -> bool {
        let Some(active) = self.state.active() else {
            return true;
        };

        match &active.terms {
            LockTerms::Timer(timer) => now >= timer.unlock_at(active.created_at),
            LockTerms::Schedule(schedule) => {
                schedule.active_window(&self.local_time(now)).is_none()
            }
            LockTerms::Restart(restart) => restart.restarts_remaining == 0,
            LockTerms::RandomText(text) => {
                !text.is_exhausted() && input.is_some_and(|i| text.matches(i))
            }
            LockTerms::Breakable(b) => b.ready_to_unlock,
        }
    }

    /// Try to release the lock.
    ///
    /// A wrong RandomText answer consumes one attempt. Once attempts are
    /// exhausted every request is rejected regardless of input.
    pub fn request_unlock(&mut self, now: DateTime<Utc>, input: Option<&str>) -> UnlockOutcome {
        let local = self.local_time(now);
        let Some(active) = self.state.active_mut() else {
            debug!("unlock requested with no active lock");
            return UnlockOutcome::AlreadyUnlocked;
        };
        let kind = active.terms.kind();
        let created_at = active.created_at;

        let verdict = match &mut active.terms {
            LockTerms::Timer(timer) => {
                let remaining = timer.remaining(created_at, now);
                if now >= timer.unlock_at(created_at) {
                    Ok(())
                } else {
                    Err(DenialReason::TimerRunning {
                        remaining_secs: remaining.num_seconds().max(1),
                    })
                }
            }
            LockTerms::Schedule(schedule) => match schedule.active_window(&local) {
                Some(window) => Err(DenialReason::InsideScheduleWindow { until: window.end }),
                None => Ok(()),
            },
            LockTerms::Restart(restart) => {
                if restart.restarts_remaining == 0 {
                    Ok(())
                } else {
                    Err(DenialReason::RestartsRemaining {
                        remaining: restart.restarts_remaining,
                    })
                }
            }
            LockTerms::RandomText(text) => {
                if text.is_exhausted() {
                    Err(DenialReason::AttemptsExhausted)
                } else {
                    match input {
                        None => Err(DenialReason::TextRequired),
                        Some(given) if text.matches(given) => Ok(()),
                        Some(_) => {
                            text.attempt_count += 1;
                            if text.is_exhausted() {
                                Err(DenialReason::AttemptsExhausted)
                            } else {
                                Err(DenialReason::WrongText {
                                    attempts_left: text.attempts_left(),
                                })
                            }
                        }
                    }
                }
            }
            LockTerms::Breakable(b) => {
                if b.ready_to_unlock {
                    Ok(())
                } else if b.countdown_started_at.is_none() {
                    Err(DenialReason::CountdownNotStarted)
                } else {
                    let remaining = b.remaining_delay(now);
                    if remaining <= Duration::zero() {
                        b.ready_to_unlock = true;
                        Ok(())
                    } else {
                        Err(DenialReason::CountdownRunning {
                            remaining_secs: remaining.num_seconds().max(1),
                        })
                    }
                }
            }
        };

        match verdict {
            Ok(()) => {
                self.state.clear();
                info!(lock_type = %kind, "lock released");
                UnlockOutcome::Unlocked(kind)
            }
            Err(reason) => {
                info!(lock_type = %kind, reason = %reason, "unlock denied");
                UnlockOutcome::Denied(reason)
            }
        }
    }

    /// Begin the non-cancelable countdown of a Breakable lock.
    ///
    /// Calling it again while the countdown runs does not restart it; the
    /// current remaining delay is returned.
    pub fn start_breakable_countdown(&mut self, now: DateTime<Utc>) -> Result<Duration> {
        let active = self.state.active_mut().ok_or(LockError::NotLocked)?;
        let actual = active.terms.kind();
        let LockTerms::Breakable(b) = &mut active.terms else {
            return Err(LockError::WrongVariant {
                expected: LockKind::Breakable,
                actual,
            });
        };

        if b.countdown_started_at.is_none() && !b.ready_to_unlock {
            b.countdown_started_at = Some(now);
            info!(
                delay_secs = b.total_delay_secs,
                "breakable countdown started"
            );
        }
        Ok(b.remaining_delay(now))
    }

    /// Advance time-driven progression. Returns an event when a countdown completes.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<LockEvent> {
        let previous = self.last_tick.replace(now);
        let active = self.state.active_mut()?;

        match &mut active.terms {
            LockTerms::Timer(timer) => {
                let unlock_at = timer.unlock_at(active.created_at);
                let crossed = previous.map_or(true, |prev| prev < unlock_at);
                if now >= unlock_at && crossed {
                    info!("lock timer elapsed");
                    return Some(LockEvent::TimerElapsed);
                }
                None
            }
            LockTerms::Breakable(b) if b.countdown_active() => {
                if b.remaining_delay(now) <= Duration::zero() {
                    b.ready_to_unlock = true;
                    info!("breakable countdown finished, ready to unlock");
                    return Some(LockEvent::BreakableReady);
                }
                None
            }
            _ => None,
        }
    }

    /// Recompute in-flight countdowns from their persisted start instants.
    pub fn resume_after_restart(&mut self, now: DateTime<Utc>) -> ResumeOutcome {
        self.last_tick = Some(now);
        let Some(active) = self.state.active_mut() else {
            return ResumeOutcome::Idle;
        };

        match &mut active.terms {
            LockTerms::Timer(timer) => {
                let remaining = timer.remaining(active.created_at, now);
                if remaining <= Duration::zero() {
                    info!("lock timer elapsed while stopped");
                    ResumeOutcome::Completed(LockEvent::TimerElapsed)
                } else {
                    debug!(remaining_secs = remaining.num_seconds(), "timer resumed");
                    ResumeOutcome::Resumed { remaining }
                }
            }
            LockTerms::Breakable(b) if b.countdown_active() => {
                let remaining = b.remaining_delay(now);
                if remaining <= Duration::zero() {
                    b.ready_to_unlock = true;
                    info!("breakable countdown finished while stopped");
                    ResumeOutcome::Completed(LockEvent::BreakableReady)
                } else {
                    debug!(
                        remaining_secs = remaining.num_seconds(),
                        "breakable countdown resumed"
                    );
                    ResumeOutcome::Resumed { remaining }
                }
            }
            _ => ResumeOutcome::Idle,
        }
    }

    /// Record a start of the governing process (Restart locks).
    pub fn observe_process_start(&mut self, started_at: DateTime<Utc>) -> Option<LockEvent> {
        let active = self.state.active_mut()?;
        let LockTerms::Restart(restart) = &mut active.terms else {
            return None;
        };

        if restart.observe_start(active.created_at, started_at) {
            info!(
                remaining = restart.restarts_remaining,
                "process restart counted"
            );
            Some(LockEvent::RestartCounted {
                remaining: restart.restarts_remaining,
            })
        } else {
            None
        }
    }

    /// Whether a Schedule lock currently has an active window
    pub fn schedule_window_active(&self, now: DateTime<Utc>) -> bool {
        match self.state.active().map(|active| &active.terms) {
            Some(LockTerms::Schedule(schedule)) => {
                schedule.active_window(&self.local_time(now)).is_some()
            }
            _ => false,
        }
    }

    /// External "lock removed" action. Aborts any countdown and clears the lock
    /// without evaluating its predicate; callers gate this on protection level.
    pub fn remove(&mut self) -> Option<LockEvent> {
        let removed = self.state.clear()?;
        let kind = removed.terms.kind();
        info!(lock_type = %kind, "lock removed");
        Some(LockEvent::Removed(kind))
    }
}
