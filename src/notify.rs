//! User-facing notifications for lock transitions
//!
//! The authority reports lock events through a [`Notifier`]. `LogNotifier`
//! writes them to the log; `MemoryNotifier` records them for tests.

use std::sync::{Arc, Mutex};
use steadfast_core_lock::LockEvent;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Notification {
            title: title.into(),
            body: body.into(),
        }
    }

    /// The notification for a lock event, if the user should hear about it
    pub fn from_event(event: &LockEvent) -> Option<Self> {
        let notification = match event {
            LockEvent::TimerElapsed => {
                Notification::new("Timer finished", "The lock can now be unlocked.")
            }
            LockEvent::BreakableReady => Notification::new(
                "Countdown finished",
                "The breakable lock can now be unlocked.",
            ),
            LockEvent::CountdownStarted { remaining_secs } => Notification::new(
                "Countdown started",
                format!("Unlock becomes possible in {}.", format_secs(*remaining_secs)),
            ),
            LockEvent::RestartCounted { remaining } => Notification::new(
                "Restart counted",
                format!("{} restart(s) still required.", remaining),
            ),
            LockEvent::Unlocked(kind) => {
                Notification::new("Unlocked", format!("The {} lock was released.", kind))
            }
            LockEvent::Removed(kind) => {
                Notification::new("Lock removed", format!("The {} lock was removed.", kind))
            }
            LockEvent::Activated(_) => return None,
        };
        Some(notification)
    }
}

/// `90` -> `1m 30s`
pub fn format_secs(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {}m", h, m)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Notifies by logging at `info`
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        info!(title = %notification.title, "{}", notification.body);
    }
}

/// Keeps every notification in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: &Notification) {
        let mut sent = match self.sent.lock() {
            Ok(sent) => sent,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push(notification.clone());
    }
}
