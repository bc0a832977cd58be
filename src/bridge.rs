//! Native-messaging bridge between browser agents and the state directory
//!
//! The bridge answers agent requests from the published configuration,
//! stores heartbeats for the authority and pushes a fresh
//! `updateBlockedDomains` whenever the published version changes. It never
//! writes the configuration itself.
//!
//! Stdout is the channel: nothing else may be written to it.

use crate::config::Settings;
use chrono::{DateTime, Utc};
use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use steadfast_core_config::{ConfigStore, ConfigWatcher, HeartbeatRecord, LivenessStore, PollOutcome};
use steadfast_proto::{BlockedDomainsUpdate, FrameReader, FrameSender, Heartbeat, Message, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Starts the companion app for `openApp`
pub trait Launcher: Send + Sync {
    fn launch(&self) -> io::Result<()>;
}

/// Spawns a configured program, detached from the channel's stdio
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    argv: Option<Vec<String>>,
}

impl CommandLauncher {
    pub fn new(argv: Option<Vec<String>>) -> Self {
        CommandLauncher { argv }
    }

    /// Start the program and wait on it from a background thread so it is
    /// reaped when it exits
    fn spawn_reaped(&self) -> io::Result<JoinHandle<Option<ExitStatus>>> {
        let Some((program, args)) = self.argv.as_deref().and_then(|argv| argv.split_first()) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no app_command configured",
            ));
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id();
        info!(program = %program, pid, "Launched app");

        thread::Builder::new()
            .name("app-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) => {
                    debug!(pid, %status, "Launched app exited");
                    Some(status)
                }
                Err(e) => {
                    warn!(pid, error = %e, "Failed to wait for launched app");
                    None
                }
            })
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self) -> io::Result<()> {
        self.spawn_reaped().map(drop)
    }
}

/// Why a long-lived session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The agent closed the stream
    EndOfStream,
    Cancelled,
    /// Framing violation; the stream cannot be trusted any more
    ProtocolViolation,
    /// Writing to the agent failed
    Disconnected,
}

pub struct Bridge<L> {
    watcher: ConfigWatcher,
    liveness: LivenessStore,
    launcher: L,
    poll_interval: Duration,
    pushed_version: Option<u64>,
}

impl<L: Launcher> Bridge<L> {
    pub fn new(settings: &Settings, launcher: L) -> Self {
        Bridge {
            watcher: ConfigWatcher::new(ConfigStore::new(&settings.state_dir)),
            liveness: LivenessStore::new(&settings.state_dir),
            launcher,
            poll_interval: settings.poll_interval(),
            pushed_version: None,
        }
    }

    /// The response to one agent message
    pub fn handle(&mut self, message: Message, now: DateTime<Utc>) -> Message {
        match message {
            Message::GetBlockedDomains => self.blocked_domains(),
            Message::Heartbeat(heartbeat) => self.record_heartbeat(heartbeat, now),
            Message::OpenApp => match self.launcher.launch() {
                Ok(()) => Message::OpenAppAck,
                Err(e) => {
                    warn!(error = %e, "Failed to launch app");
                    Message::error(format!("failed to open app: {}", e))
                }
            },
            other => {
                debug!(kind = other.kind(), "Unexpected message from agent");
                Message::error(format!("unexpected message type '{}'", other.kind()))
            }
        }
    }

    fn blocked_domains(&mut self) -> Message {
        // Unavailable keeps the previous last-known-good
        self.watcher.poll();
        match self.watcher.last_good() {
            Some(published) => {
                self.pushed_version = Some(published.version);
                Message::UpdateBlockedDomains(BlockedDomainsUpdate::from_published(published))
            }
            None => Message::error("configuration unavailable"),
        }
    }

    fn record_heartbeat(&mut self, heartbeat: Heartbeat, now: DateTime<Utc>) -> Message {
        let record = HeartbeatRecord {
            agent_kind: heartbeat.agent_kind,
            profile_id: heartbeat.profile_id,
            sequence: heartbeat.sequence,
            timestamp: heartbeat.timestamp,
            window_count: heartbeat.window_count,
            incognito_allowed: heartbeat.incognito_allowed,
            received_at: now,
        };
        match self.liveness.record(&record) {
            Ok(()) => {
                debug!(
                    agent_kind = %record.agent_kind,
                    profile_id = %record.profile_id,
                    sequence = record.sequence,
                    "Heartbeat recorded"
                );
                Message::heartbeat_ack()
            }
            Err(e) => {
                warn!(error = %e, "Failed to record heartbeat");
                Message::error(format!("failed to record heartbeat: {}", e))
            }
        }
    }

    /// A push for the agent if the published version moved since the last one sent
    fn poll_for_push(&mut self) -> Option<Message> {
        let PollOutcome::Changed(published) = self.watcher.poll() else {
            return None;
        };
        if self.pushed_version == Some(published.version) {
            return None;
        }
        self.pushed_version = Some(published.version);
        info!(version = published.version, "Pushing configuration update");
        Some(Message::UpdateBlockedDomains(
            BlockedDomainsUpdate::from_published(&published),
        ))
    }

    /// Serve one long-lived agent connection until it ends
    pub async fn serve<R, W>(
        &mut self,
        mut reader: FrameReader<R>,
        sender: FrameSender<W>,
        cancel: CancellationToken,
    ) -> BridgeExit
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut poll = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Bridge session started");

        loop {
            let reply = tokio::select! {
                _ = cancel.cancelled() => return BridgeExit::Cancelled,
                _ = poll.tick() => match self.poll_for_push() {
                    Some(update) => update,
                    None => continue,
                },
                frame = reader.recv() => match frame {
                    Ok(None) => {
                        info!("Agent closed the channel");
                        return BridgeExit::EndOfStream;
                    }
                    Ok(Some(message)) => self.handle(message, Utc::now()),
                    Err(e) if e.is_fatal() => {
                        warn!(error = %e, "Protocol violation, closing channel");
                        return BridgeExit::ProtocolViolation;
                    }
                    Err(e) => {
                        warn!(error = %e, "Rejected message");
                        Message::error(e.to_string())
                    }
                },
            };

            if let Err(e) = sender.send(&reply).await {
                warn!(error = %e, "Failed to write to agent");
                return BridgeExit::Disconnected;
            }
        }
    }

    /// Read exactly one frame and write exactly one response
    pub async fn serve_once<R, W>(
        &mut self,
        mut reader: FrameReader<R>,
        sender: FrameSender<W>,
    ) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let reply = match reader.recv().await {
            Ok(None) => return Ok(()),
            Ok(Some(message)) => self.handle(message, Utc::now()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => Message::error(e.to_string()),
        };
        sender.send(&reply).await
    }
}
