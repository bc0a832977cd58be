//! The authority: single owner of the block configuration and the lock
//!
//! Holding the [`AuthorityLease`] is what makes a process the authority. It
//! loads the persisted lock, applies control requests under the commitment
//! rules, drives lock progression from a tick and republishes the whole
//! configuration after every change.
//!
//! `lock.json` keeps the full lock terms (including a RandomText secret);
//! only the [`LockSummary`](steadfast_core_lock::LockSummary) is published.

pub mod commands;
#[cfg(unix)]
pub mod control;

pub use commands::{ControlRequest, ControlResponse, StatusReport};

use crate::config::Settings;
use crate::error::{Result, SteadfastError};
use crate::liveness::{LivenessTracker, TamperAlert};
use crate::notify::{format_secs, LogNotifier, Notification, Notifier};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use steadfast_core_config::persist::{read_json, write_json_atomic};
use steadfast_core_config::{AuthorityLease, BlockConfiguration, ConfigStore, LivenessStore};
use steadfast_core_lock::{
    Capability, DenialReason, LockError, LockEvent, LockMachine, LockState, LockTerms,
    ProtectionLevel, ResumeOutcome, UnlockOutcome,
};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const LOCK_FILE: &str = "lock.json";

pub struct Authority<N> {
    lease: AuthorityLease,
    store: ConfigStore,
    lock_path: PathBuf,
    settings_path: Option<PathBuf>,
    settings: Settings,
    config: BlockConfiguration,
    machine: LockMachine,
    notifier: N,
    version: Option<u64>,
    liveness: LivenessTracker,
    liveness_store: LivenessStore,
    alerts: Vec<TamperAlert>,
}

impl<N: Notifier> Authority<N> {
    /// Take the lease and load the persisted configuration and lock.
    ///
    /// An unreadable record is an error: publishing over it would silently
    /// drop whatever it blocked.
    pub fn open(settings: Settings, settings_path: Option<PathBuf>, notifier: N) -> Result<Self> {
        let lease = AuthorityLease::acquire(&settings.state_dir)?;
        let store = ConfigStore::new(&settings.state_dir);
        let lock_path = settings.state_dir.join(LOCK_FILE);

        let (config, version) = match store.read()? {
            Some(published) => (published.config, Some(published.version)),
            None => (BlockConfiguration::default(), None),
        };
        let lock_state: LockState = read_json(&lock_path)?.unwrap_or_default();
        debug!(
            state_dir = %settings.state_dir.display(),
            lock_type = %lock_state.kind(),
            version = ?version,
            "Authority opened"
        );

        Ok(Authority {
            lease,
            store,
            lock_path,
            settings_path,
            liveness: LivenessTracker::new(settings.agent_stale_after()),
            liveness_store: LivenessStore::new(&settings.state_dir),
            settings,
            config,
            machine: LockMachine::new(lock_state),
            notifier,
            version,
            alerts: Vec::new(),
        })
    }

    /// Use a fixed UTC offset for schedule windows instead of the system zone
    pub fn with_utc_offset(mut self, offset: chrono::FixedOffset) -> Self {
        self.machine = self.machine.with_utc_offset(offset);
        self
    }

    pub fn config(&self) -> &BlockConfiguration {
        &self.config
    }

    pub fn lock_state(&self) -> &LockState {
        self.machine.state()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Daemon start: count the restart, resume countdowns, publish.
    ///
    /// Only a long-lived authority calls this; one-shot CLI invocations
    /// must not count as restarts.
    pub fn start(&mut self, started_at: DateTime<Utc>) -> Result<()> {
        if let Some(event) = self.machine.observe_process_start(started_at) {
            self.emit(&event);
        }
        match self.machine.resume_after_restart(started_at) {
            ResumeOutcome::Completed(event) => self.emit(&event),
            ResumeOutcome::Resumed { remaining } => info!(
                lock_type = %self.machine.state().kind(),
                remaining = %format_secs(remaining.num_seconds()),
                "Countdown resumed"
            ),
            ResumeOutcome::Idle => {}
        }
        self.enforce_schedule(started_at);
        self.commit(started_at)
    }

    /// One-shot start: pick up countdowns without counting a restart.
    ///
    /// An elapsed timer is not announced again here. Only a breakable
    /// countdown finishing or a schedule window opening is committed.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let finished = match self.machine.resume_after_restart(now) {
            ResumeOutcome::Completed(event @ LockEvent::BreakableReady) => {
                self.emit(&event);
                true
            }
            _ => false,
        };
        let forced = self.enforce_schedule(now);
        if finished || forced {
            self.commit(now)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Advance countdowns and schedule windows; republish on change
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let event = self.machine.tick(now);
        if let Some(event) = &event {
            self.emit(event);
        }
        let forced = self.enforce_schedule(now);
        if event.is_some() || forced {
            self.commit(now)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// A schedule lock turns blocking on while one of its windows is active
    fn enforce_schedule(&mut self, now: DateTime<Utc>) -> bool {
        if self.machine.schedule_window_active(now) && !self.config.is_blocking {
            info!("Schedule window active, blocking enabled");
            self.config.is_blocking = true;
            return true;
        }
        false
    }

    /// Read heartbeat records and report agents that look disabled
    pub fn sweep_liveness(&mut self, now: DateTime<Utc>) -> Vec<TamperAlert> {
        if let Err(e) = self.liveness.sweep(&self.liveness_store) {
            warn!(error = %e, "Failed to read liveness records");
        }
        let alerts = self.liveness.tamper_alerts(
            now,
            self.settings.protection_level,
            self.config.is_blocking,
        );
        for alert in alerts.iter().filter(|a| !self.alerts.contains(a)) {
            warn!(
                agent_kind = %alert.agent_kind,
                profile_id = %alert.profile_id,
                "TamperSuspected: {}",
                alert
            );
        }
        for cleared in self.alerts.iter().filter(|a| !alerts.contains(a)) {
            info!(agent_kind = %cleared.agent_kind, profile_id = %cleared.profile_id, "Agent recovered");
        }
        self.alerts = alerts.clone();
        alerts
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> StatusReport {
        self.sweep_liveness(now);
        let level = self.settings.protection_level;
        StatusReport {
            version: self.version,
            authority_pid: self.lease.pid(),
            is_blocking: self.config.is_blocking,
            blocked_domains: self.config.blocked_domains.iter().cloned().collect(),
            blocked_apps: self.config.blocked_apps.iter().cloned().collect(),
            url_exceptions: self.config.url_exceptions.clone(),
            lock: self.machine.state().summary(now),
            protection_level: level,
            capabilities: level.capabilities(),
            agents: self.liveness.snapshot(now),
        }
    }

    /// Apply one control request under the commitment rules.
    ///
    /// Denials are responses; `Err` means persisting or publishing failed,
    /// in which case the configuration, lock and protection level are left
    /// as they were before the request.
    pub fn handle(&mut self, request: ControlRequest, now: DateTime<Utc>) -> Result<ControlResponse> {
        let snapshot = (
            self.config.clone(),
            self.machine.clone(),
            self.settings.protection_level,
        );
        let result = self.apply(request, now);
        if let Err(e) = &result {
            warn!(error = %e, "Request not committed, rolling back");
            self.rollback(snapshot);
        }
        result
    }

    fn rollback(
        &mut self,
        (config, machine, level): (BlockConfiguration, LockMachine, ProtectionLevel),
    ) {
        self.config = config;
        self.machine = machine;
        if self.settings.protection_level != level {
            self.settings.protection_level = level;
            if let Err(e) = self.save_settings() {
                warn!(error = %e, "Failed to restore settings file");
            }
        }
        // lock.json is written before publishing and may be ahead
        if let Err(e) = write_json_atomic(&self.lock_path, self.machine.state()) {
            warn!(error = %e, "Failed to restore lock file");
        }
    }

    fn apply(&mut self, request: ControlRequest, now: DateTime<Utc>) -> Result<ControlResponse> {
        if request.loosens() && self.machine.is_locked() {
            let reason = format!(
                "{} is not allowed while a {} lock is active",
                request.name(),
                self.machine.state().kind()
            );
            info!(request = request.name(), "Denied: {}", reason);
            return Ok(ControlResponse::denied(reason));
        }

        let response = match request {
            ControlRequest::Status => ControlResponse::Status(self.status(now)),
            ControlRequest::AddDomains { domains } => match self.config.add_domains(&domains) {
                Ok(added) => {
                    self.commit(now)?;
                    ControlResponse::ok(format!("Added {} domain(s)", added))
                }
                Err(e) => ControlResponse::error(e.to_string()),
            },
            ControlRequest::RemoveDomains { domains } => match self.config.remove_domains(&domains)
            {
                Ok(removed) => {
                    self.commit(now)?;
                    ControlResponse::ok(format!("Removed {} domain(s)", removed))
                }
                Err(e) => ControlResponse::error(e.to_string()),
            },
            ControlRequest::AddApps { apps } => {
                let added = self.config.add_apps(&apps);
                self.commit(now)?;
                ControlResponse::ok(format!("Added {} app(s)", added))
            }
            ControlRequest::RemoveApps { apps } => {
                let removed = self.config.remove_apps(&apps);
                self.commit(now)?;
                ControlResponse::ok(format!("Removed {} app(s)", removed))
            }
            ControlRequest::AddException { domain, paths } => {
                match self.config.add_exception(&domain, &paths) {
                    Ok(()) => {
                        self.commit(now)?;
                        ControlResponse::ok(format!("Exception saved for {}", domain))
                    }
                    Err(e) => ControlResponse::error(e.to_string()),
                }
            }
            ControlRequest::RemoveException { domain } => {
                match self.config.remove_exception(&domain) {
                    Ok(true) => {
                        self.commit(now)?;
                        ControlResponse::ok(format!("Exception removed for {}", domain))
                    }
                    Ok(false) => ControlResponse::ok(format!("No exception for {}", domain)),
                    Err(e) => ControlResponse::error(e.to_string()),
                }
            }
            ControlRequest::SetBlocking { enabled } => {
                self.config.is_blocking = enabled;
                self.commit(now)?;
                ControlResponse::ok(if enabled {
                    "Blocking started"
                } else {
                    "Blocking stopped"
                })
            }
            ControlRequest::ActivateLock { terms } => self.activate(terms, now)?,
            ControlRequest::RequestUnlock { input } => self.request_unlock(input.as_deref(), now)?,
            ControlRequest::StartBreakableCountdown => {
                match self.machine.start_breakable_countdown(now) {
                    Ok(remaining) => {
                        let remaining_secs = remaining.num_seconds();
                        self.emit(&LockEvent::CountdownStarted { remaining_secs });
                        self.commit(now)?;
                        ControlResponse::ok(format!(
                            "Unlock possible in {}",
                            format_secs(remaining_secs)
                        ))
                    }
                    Err(e) => ControlResponse::denied(e.to_string()),
                }
            }
            ControlRequest::RemoveLock => {
                let level = self.settings.protection_level;
                if level.enables(Capability::LockRemovalGuard) {
                    ControlResponse::denied(format!(
                        "lock removal is disabled at protection level {}",
                        level
                    ))
                } else {
                    match self.machine.remove() {
                        Some(event) => {
                            self.emit(&event);
                            self.commit(now)?;
                            ControlResponse::ok("Lock removed")
                        }
                        None => ControlResponse::ok("No lock is active"),
                    }
                }
            }
            ControlRequest::SetProtection { level } => {
                let current = self.settings.protection_level;
                if level < current && self.machine.is_locked() {
                    ControlResponse::denied(format!(
                        "protection cannot be lowered from {} while a lock is active",
                        current
                    ))
                } else {
                    self.settings.protection_level = level;
                    self.save_settings()?;
                    self.commit(now)?;
                    info!(from = %current, to = %level, "Protection level changed");
                    ControlResponse::ok(format!("Protection level set to {}", level))
                }
            }
        };
        Ok(response)
    }

    fn activate(&mut self, terms: LockTerms, now: DateTime<Utc>) -> Result<ControlResponse> {
        match self.machine.activate(terms, now) {
            Ok(event) => {
                self.emit(&event);
                self.config.is_blocking = true;
                self.commit(now)?;
                Ok(ControlResponse::ok(format!(
                    "{} lock activated",
                    self.machine.state().kind()
                )))
            }
            Err(e @ LockError::AlreadyLocked { .. }) => Ok(ControlResponse::denied(e.to_string())),
            Err(e) => Ok(ControlResponse::error(e.to_string())),
        }
    }

    fn request_unlock(&mut self, input: Option<&str>, now: DateTime<Utc>) -> Result<ControlResponse> {
        let challenge = self.challenge();
        let outcome = self.machine.request_unlock(now, input);
        // Attempt counts change even on denial
        self.commit(now)?;
        Ok(match outcome {
            UnlockOutcome::Unlocked(kind) => {
                self.emit(&LockEvent::Unlocked(kind));
                ControlResponse::ok(format!("{} lock released", kind))
            }
            UnlockOutcome::AlreadyUnlocked => ControlResponse::ok("No lock is active"),
            UnlockOutcome::Denied(reason) => ControlResponse::Denied {
                challenge: match reason {
                    DenialReason::TextRequired | DenialReason::WrongText { .. } => challenge,
                    _ => None,
                },
                reason: reason.to_string(),
            },
        })
    }

    /// The secret of an active RandomText lock
    fn challenge(&self) -> Option<String> {
        match self.machine.state().active().map(|active| &active.terms) {
            Some(LockTerms::RandomText(text)) => Some(text.secret.clone()),
            _ => None,
        }
    }

    fn emit(&self, event: &LockEvent) {
        info!(event = ?event, "Lock event");
        if let Some(notification) = Notification::from_event(event) {
            self.notifier.notify(&notification);
        }
    }

    fn save_settings(&self) -> Result<()> {
        let path = self
            .settings_path
            .clone()
            .or_else(Settings::default_path)
            .ok_or_else(|| SteadfastError::Config("no settings path available".to_string()))?;
        self.settings.to_file(&path)
    }

    /// Persist the lock and publish the whole configuration
    fn commit(&mut self, now: DateTime<Utc>) -> Result<()> {
        write_json_atomic(&self.lock_path, self.machine.state())?;
        self.config.lock_state = self.machine.state().summary(now);
        self.config.protection_level = self.settings.protection_level;
        let version = self.store.publish(&self.lease, &self.config, now)?;
        self.version = Some(version);
        info!(
            version,
            is_blocking = self.config.is_blocking,
            lock_type = %self.config.lock_state.lock_type,
            "Configuration published"
        );
        Ok(())
    }
}

/// Apply a request through the running daemon, or in-process if there is none
pub async fn dispatch(
    settings: &Settings,
    settings_path: Option<&Path>,
    request: ControlRequest,
) -> Result<ControlResponse> {
    #[cfg(unix)]
    {
        if let Some(response) =
            control::request(&settings.state_dir, &request, settings.max_frame_bytes).await?
        {
            return Ok(response);
        }
    }

    let mut authority = Authority::open(
        settings.clone(),
        settings_path.map(Path::to_path_buf),
        LogNotifier,
    )?;
    let now = Utc::now();
    authority.resume(now)?;
    authority.handle(request, now)
}

/// Run the long-lived authority until Ctrl-C
pub async fn run_daemon(settings: Settings, settings_path: Option<PathBuf>) -> Result<()> {
    let started_at = Utc::now();
    let mut authority = Authority::open(settings.clone(), settings_path, LogNotifier)?;
    authority.start(started_at)?;
    info!(
        pid = std::process::id(),
        state_dir = %settings.state_dir.display(),
        "Authority started"
    );

    let authority = Arc::new(Mutex::new(authority));
    let cancel = CancellationToken::new();

    #[cfg(unix)]
    let server = {
        let listener = control::bind(&settings.state_dir)?;
        tokio::spawn(control::serve(
            listener,
            Arc::clone(&authority),
            settings.max_frame_bytes,
            cancel.child_token(),
        ))
    };

    let mut tick = interval(settings.tick_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sweep = interval(settings.poll_interval());
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Shutting down authority");
                break;
            }
            _ = tick.tick() => {
                if let Err(e) = authority.lock().await.tick(Utc::now()) {
                    error!(error = %e, "Lock tick failed");
                }
            }
            _ = sweep.tick() => {
                authority.lock().await.sweep_liveness(Utc::now());
            }
        }
    }

    cancel.cancel();
    #[cfg(unix)]
    {
        if let Err(e) = server.await {
            warn!(error = %e, "Control server task failed");
        }
        control::unbind(&settings.state_dir);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;
    use chrono::{Duration, TimeZone};
    use steadfast_core_lock::{BreakableLock, RandomTextLock, TimerLock};
    use tempfile::{tempdir, TempDir};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn open(dir: &TempDir, level: ProtectionLevel) -> (Authority<MemoryNotifier>, MemoryNotifier) {
        let settings = Settings {
            state_dir: dir.path().join("state"),
            protection_level: level,
            ..Default::default()
        };
        let notifier = MemoryNotifier::new();
        let authority = Authority::open(
            settings,
            Some(dir.path().join("settings.toml")),
            notifier.clone(),
        )
        .unwrap();
        (authority, notifier)
    }

    #[test]
    fn test_add_domains_publishes() {
        let dir = tempdir().unwrap();
        let (mut authority, _) = open(&dir, ProtectionLevel::Standard);
        let response = authority
            .handle(
                ControlRequest::AddDomains {
                    domains: vec!["https://www.Example.com/path".to_string()],
                },
                t0(),
            )
            .unwrap();
        assert_eq!(response, ControlResponse::ok("Added 1 domain(s)"));

        let published = ConfigStore::new(dir.path().join("state")).read().unwrap().unwrap();
        assert!(published.config.blocked_domains.contains("example.com"));
        assert_eq!(authority.version(), Some(published.version));
    }

    #[test]
    fn test_invalid_domain_is_error_response() {
        let dir = tempdir().unwrap();
        let (mut authority, _) = open(&dir, ProtectionLevel::Standard);
        let response = authority
            .handle(
                ControlRequest::AddDomains {
                    domains: vec!["   ".to_string()],
                },
                t0(),
            )
            .unwrap();
        assert!(matches!(response, ControlResponse::Error { .. }));
        assert_eq!(authority.version(), None);
    }

    #[test]
    fn test_random_text_denial_carries_challenge() {
        let dir = tempdir().unwrap();
        let (mut authority, _) = open(&dir, ProtectionLevel::Standard);
        authority
            .handle(
                ControlRequest::ActivateLock {
                    terms: LockTerms::RandomText(RandomTextLock::with_secret("Xy7q", 3)),
                },
                t0(),
            )
            .unwrap();

        let denied = authority
            .handle(ControlRequest::RequestUnlock { input: None }, t0())
            .unwrap();
        assert!(matches!(
            denied,
            ControlResponse::Denied { challenge: Some(ref c), .. } if c == "Xy7q"
        ));

        let unlocked = authority
            .handle(
                ControlRequest::RequestUnlock {
                    input: Some("Xy7q".to_string()),
                },
                t0(),
            )
            .unwrap();
        assert_eq!(unlocked, ControlResponse::ok("randomText lock released"));
    }

    #[test]
    fn test_lock_removal_guard() {
        let dir = tempdir().unwrap();
        let (mut authority, _) = open(&dir, ProtectionLevel::Standard);
        authority
            .handle(
                ControlRequest::ActivateLock {
                    terms: LockTerms::Timer(TimerLock::new(3600)),
                },
                t0(),
            )
            .unwrap();
        assert!(authority
            .handle(ControlRequest::RemoveLock, t0())
            .unwrap()
            .is_denied());
        assert!(authority
            .handle(
                ControlRequest::SetProtection {
                    level: ProtectionLevel::None
                },
                t0()
            )
            .unwrap()
            .is_denied());
        assert!(authority.lock_state().is_locked());
    }

    #[test]
    fn test_lock_removed_at_level_none() {
        let dir = tempdir().unwrap();
        let (mut authority, notifier) = open(&dir, ProtectionLevel::None);
        authority
            .handle(
                ControlRequest::ActivateLock {
                    terms: LockTerms::Breakable(BreakableLock::new(60)),
                },
                t0(),
            )
            .unwrap();
        authority
            .handle(ControlRequest::StartBreakableCountdown, t0())
            .unwrap();

        let response = authority.handle(ControlRequest::RemoveLock, t0()).unwrap();
        assert_eq!(response, ControlResponse::ok("Lock removed"));
        assert!(!authority.lock_state().is_locked());
        assert_eq!(notifier.sent().last().unwrap().title, "Lock removed");
    }

    #[test]
    fn test_tick_notifies_when_timer_elapses() {
        let dir = tempdir().unwrap();
        let (mut authority, notifier) = open(&dir, ProtectionLevel::Standard);
        authority
            .handle(
                ControlRequest::ActivateLock {
                    terms: LockTerms::Timer(TimerLock::new(60)),
                },
                t0(),
            )
            .unwrap();

        assert!(!authority.tick(t0() + Duration::seconds(30)).unwrap());
        assert!(authority.tick(t0() + Duration::seconds(61)).unwrap());
        assert!(!authority.tick(t0() + Duration::seconds(62)).unwrap());
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent()[0].title, "Timer finished");
    }

    #[test]
    fn test_one_shot_resume_does_not_repeat_elapsed_timer() {
        let dir = tempdir().unwrap();
        let (mut authority, _) = open(&dir, ProtectionLevel::Standard);
        authority
            .handle(
                ControlRequest::ActivateLock {
                    terms: LockTerms::Timer(TimerLock::new(60)),
                },
                t0(),
            )
            .unwrap();
        let activated = authority.version();
        drop(authority);

        for minutes in [5, 6] {
            let (mut one_shot, notifier) = open(&dir, ProtectionLevel::Standard);
            let now = t0() + Duration::minutes(minutes);
            assert!(!one_shot.resume(now).unwrap());
            one_shot.handle(ControlRequest::Status, now).unwrap();
            assert!(notifier.sent().is_empty());
            assert_eq!(one_shot.version(), activated);
        }
    }

    #[test]
    fn test_one_shot_resume_commits_finished_countdown_once() {
        let dir = tempdir().unwrap();
        let (mut authority, _) = open(&dir, ProtectionLevel::Standard);
        authority
            .handle(
                ControlRequest::ActivateLock {
                    terms: LockTerms::Breakable(BreakableLock::new(60)),
                },
                t0(),
            )
            .unwrap();
        authority
            .handle(ControlRequest::StartBreakableCountdown, t0())
            .unwrap();
        drop(authority);

        let later = t0() + Duration::minutes(5);
        let (mut first, notifier) = open(&dir, ProtectionLevel::Standard);
        assert!(first.resume(later).unwrap());
        assert_eq!(notifier.sent().len(), 1);
        let version = first.version();
        drop(first);

        let (mut second, notifier) = open(&dir, ProtectionLevel::Standard);
        assert!(!second.resume(later).unwrap());
        assert!(notifier.sent().is_empty());
        assert_eq!(second.version(), version);
    }

    #[test]
    fn test_failed_publish_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let (mut authority, _) = open(&dir, ProtectionLevel::Standard);
        authority
            .handle(
                ControlRequest::ActivateLock {
                    terms: LockTerms::Timer(TimerLock::new(60)),
                },
                t0(),
            )
            .unwrap();
        let version = authority.version();

        // Lease file taken over by another process
        let lease_path = dir.path().join("state").join("authority.lock");
        std::fs::write(&lease_path, "4194304\n").unwrap();

        let later = t0() + Duration::seconds(61);
        assert!(authority
            .handle(ControlRequest::RequestUnlock { input: None }, later)
            .is_err());
        assert!(authority.lock_state().is_locked());
        let on_disk: LockState = read_json(&dir.path().join("state").join(LOCK_FILE))
            .unwrap()
            .unwrap();
        assert!(on_disk.is_locked());

        assert!(authority
            .handle(
                ControlRequest::AddDomains {
                    domains: vec!["example.com".to_string()],
                },
                later,
            )
            .is_err());
        assert!(authority.config().blocked_domains.is_empty());
        assert_eq!(authority.version(), version);

        // Once the lease is ours again the same unlock goes through
        std::fs::write(&lease_path, format!("{}\n", std::process::id())).unwrap();
        let response = authority
            .handle(ControlRequest::RequestUnlock { input: None }, later)
            .unwrap();
        assert_eq!(response, ControlResponse::ok("timer lock released"));
    }

    #[test]
    fn test_set_protection_is_saved() {
        let dir = tempdir().unwrap();
        let (mut authority, _) = open(&dir, ProtectionLevel::Standard);
        authority
            .handle(
                ControlRequest::SetProtection {
                    level: ProtectionLevel::Strict,
                },
                t0(),
            )
            .unwrap();

        let saved = Settings::from_file(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(saved.protection_level, ProtectionLevel::Strict);
        assert_eq!(
            authority.config().protection_level,
            ProtectionLevel::Strict
        );
    }

    #[test]
    fn test_second_authority_is_refused() {
        let dir = tempdir().unwrap();
        let (_authority, _) = open(&dir, ProtectionLevel::Standard);
        let settings = Settings {
            state_dir: dir.path().join("state"),
            ..Default::default()
        };
        let err = Authority::open(settings, None, MemoryNotifier::new())
            .err()
            .unwrap();
        assert!(matches!(err, SteadfastError::AuthorityBusy { .. }));
    }

    #[test]
    fn test_corrupt_record_refuses_to_open() {
        let dir = tempdir().unwrap();
        let state = dir.path().join("state");
        std::fs::create_dir_all(&state).unwrap();
        std::fs::write(state.join("config.json"), "{ not json").unwrap();

        let settings = Settings {
            state_dir: state,
            ..Default::default()
        };
        let err = Authority::open(settings, None, MemoryNotifier::new())
            .err()
            .unwrap();
        assert!(matches!(err, SteadfastError::ConfigUnavailable(_)));
    }
}
