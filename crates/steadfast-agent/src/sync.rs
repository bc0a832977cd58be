//! Enforcement agent sync loop
//!
//! One session per bridge connection. Inside a session three things race:
//! incoming frames, the heartbeat interval and the config poll interval. Both
//! intervals belong to the session, so they stop the moment the channel is
//! lost. Between sessions the agent waits a fixed backoff and reconnects.
//!
//! Rules survive across sessions: a lost bridge never clears what is being
//! enforced.

use crate::guardian::{Enforcement, NavigationGuardian};
use crate::identity::AgentIdentity;
use crate::rules::RuleSet;
use crate::surface::{BrowserSurface, Connector, PageId};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use steadfast_proto::{split, BlockedDomainsUpdate, Heartbeat, Message, DEFAULT_MAX_FRAME_BYTES};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    pub reconnect_backoff: Duration,
    pub max_frame_bytes: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        AgentSettings {
            heartbeat_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(2),
            reconnect_backoff: Duration::from_secs(5),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Cancelled,
    Disconnected,
    ProtocolViolation,
}

pub struct EnforcementAgent<S, C> {
    surface: Arc<S>,
    connector: C,
    identity: AgentIdentity,
    guardian: NavigationGuardian,
    settings: AgentSettings,
    last_update: Option<BlockedDomainsUpdate>,
    rules: RuleSet,
    /// Whether `rules` made it into the browser
    installed: bool,
    sequence: u64,
}

impl<S, C> EnforcementAgent<S, C>
where
    S: BrowserSurface,
    C: Connector,
{
    pub fn new(
        surface: Arc<S>,
        connector: C,
        identity: AgentIdentity,
        guardian: NavigationGuardian,
        settings: AgentSettings,
    ) -> Self {
        EnforcementAgent {
            surface,
            connector,
            identity,
            guardian,
            settings,
            last_update: None,
            installed: false,
            rules: RuleSet::default(),
            sequence: 0,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Last configuration received from the bridge
    pub fn last_known_good(&self) -> Option<&BlockedDomainsUpdate> {
        self.last_update.as_ref()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Connect, run a session, back off, repeat until cancelled
    pub async fn run(&mut self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.connector.connect().await {
                Ok(stream) => match self.run_session(stream, &cancel).await {
                    SessionEnd::Cancelled => return,
                    end => info!(?end, "Bridge session ended, enforcing last-known-good"),
                },
                Err(e) => warn!(error = %e, "Bridge unreachable, enforcing last-known-good"),
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.settings.reconnect_backoff) => {}
            }
        }
    }

    pub async fn run_session<T>(&mut self, stream: T, cancel: &CancellationToken) -> SessionEnd
    where
        T: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let (mut reader, sender) = split(stream, self.settings.max_frame_bytes);

        if let Err(e) = sender.send(&Message::GetBlockedDomains).await {
            warn!(error = %e, "Failed to request configuration");
            return SessionEnd::Disconnected;
        }

        let mut heartbeat = interval(self.settings.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll = interval_at(
            Instant::now() + self.settings.poll_interval,
            self.settings.poll_interval,
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,

                _ = heartbeat.tick() => {
                    let message = Message::Heartbeat(self.next_heartbeat().await);
                    if let Err(e) = sender.send(&message).await {
                        warn!(error = %e, "Heartbeat send failed");
                        return SessionEnd::Disconnected;
                    }
                }

                _ = poll.tick() => {
                    if let Err(e) = sender.send(&Message::GetBlockedDomains).await {
                        warn!(error = %e, "Configuration poll failed");
                        return SessionEnd::Disconnected;
                    }
                }

                received = reader.recv() => match received {
                    Ok(Some(message)) => self.handle(message).await,
                    Ok(None) => return SessionEnd::Disconnected,
                    Err(e) if e.is_fatal() => {
                        warn!(error = %e, "Protocol violation, dropping channel");
                        return SessionEnd::ProtocolViolation;
                    }
                    Err(e) => warn!(error = %e, "Ignoring unreadable message"),
                },
            }
        }
    }

    async fn handle(&mut self, message: Message) {
        match message {
            Message::UpdateBlockedDomains(update) => {
                self.apply_update(update).await;
            }
            Message::HeartbeatAck(ack) => debug!(status = %ack.status, "Heartbeat acknowledged"),
            Message::OpenAppAck => debug!("App launch acknowledged"),
            Message::Error(e) => warn!(message = %e.message, "Bridge reported an error"),
            other => debug!(kind = other.kind(), "Ignoring message not meant for agents"),
        }
    }

    /// Adopt a configuration. Returns whether rules were re-derived.
    ///
    /// A rule set the surface rejected is still enforced in-process and is
    /// installed again on the next update, even an unchanged one.
    pub async fn apply_update(&mut self, update: BlockedDomainsUpdate) -> bool {
        let unchanged = self
            .last_update
            .as_ref()
            .is_some_and(|previous| previous.same_rules(&update));
        if unchanged && self.installed {
            self.last_update = Some(update);
            return false;
        }

        let rules = RuleSet::derive(&update);
        self.installed = match self.surface.apply_rules(&rules).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Surface rejected rules, retrying on next update");
                false
            }
        };
        info!(
            version = ?update.version,
            domains = update.domains.len(),
            is_blocking = update.is_blocking,
            "Rules updated"
        );
        self.rules = rules;
        self.last_update = Some(update);
        true
    }

    /// Judge a navigation or newly created page against the current rules
    pub async fn on_navigation(&self, page: PageId, url: &str) -> Enforcement {
        self.guardian
            .enforce(self.surface.as_ref(), &self.rules, page, url)
            .await
    }

    async fn next_heartbeat(&mut self) -> Heartbeat {
        self.sequence += 1;
        Heartbeat {
            agent_kind: self.identity.agent_kind.clone(),
            timestamp: Utc::now(),
            incognito_allowed: self.surface.incognito_allowed().await,
            window_count: self.surface.window_count().await,
            profile_id: self.identity.profile_id.clone(),
            sequence: self.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;
    use async_trait::async_trait;
    use std::io;
    use steadfast_proto::{FrameReader, FrameSender};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio::sync::{mpsc, Mutex};

    /// Hands out pre-made duplex streams; refuses once they run out
    struct QueueConnector {
        streams: Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
    }

    #[async_trait]
    impl Connector for QueueConnector {
        type Stream = DuplexStream;

        async fn connect(&self) -> io::Result<DuplexStream> {
            self.streams
                .lock()
                .await
                .try_recv()
                .map_err(|_| io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    type BridgeEnd = (
        FrameReader<ReadHalf<DuplexStream>>,
        FrameSender<WriteHalf<DuplexStream>>,
    );

    fn agent_with(
        surface: Arc<MemorySurface>,
    ) -> (
        EnforcementAgent<MemorySurface, QueueConnector>,
        mpsc::UnboundedSender<DuplexStream>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = EnforcementAgent::new(
            surface,
            QueueConnector {
                streams: Mutex::new(rx),
            },
            AgentIdentity::generate("chrome"),
            NavigationGuardian::new("chrome-extension://steadfast"),
            AgentSettings::default(),
        );
        (agent, tx)
    }

    fn bridge_end(tx: &mpsc::UnboundedSender<DuplexStream>) -> BridgeEnd {
        let (agent_side, bridge_side) = tokio::io::duplex(16 * 1024);
        tx.send(agent_side).unwrap();
        split(bridge_side, DEFAULT_MAX_FRAME_BYTES)
    }

    fn blocking_update(version: u64) -> Message {
        Message::UpdateBlockedDomains(BlockedDomainsUpdate {
            domains: vec!["example.com".into()],
            is_blocking: true,
            version: Some(version),
            ..Default::default()
        })
    }

    async fn next_heartbeat(reader: &mut FrameReader<ReadHalf<DuplexStream>>) -> Heartbeat {
        loop {
            match reader.recv().await.unwrap() {
                Some(Message::Heartbeat(hb)) => return hb,
                Some(_) => continue,
                None => panic!("channel closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_requests_config_then_heartbeats() {
        let surface = Arc::new(MemorySurface::new("chrome"));
        let (mut agent, tx) = agent_with(surface.clone());
        let (mut reader, sender) = bridge_end(&tx);
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                agent.run(cancel).await;
                agent
            })
        };

        assert_eq!(reader.recv().await.unwrap(), Some(Message::GetBlockedDomains));
        let first = next_heartbeat(&mut reader).await;
        assert_eq!(first.sequence, 1);
        assert_eq!(first.agent_kind, "chrome");

        sender.send(&blocking_update(1)).await.unwrap();
        let second = next_heartbeat(&mut reader).await;
        let third = next_heartbeat(&mut reader).await;
        assert_eq!((second.sequence, third.sequence), (2, 3));
        assert_eq!(second.profile_id, first.profile_id);

        cancel.cancel();
        let agent = task.await.unwrap();
        assert!(agent.rules().is_blocking());
        assert_eq!(surface.snapshot().applied.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_update_does_not_rederive() {
        let surface = Arc::new(MemorySurface::new("chrome"));
        let (mut agent, _tx) = agent_with(surface.clone());

        let Message::UpdateBlockedDomains(update) = blocking_update(1) else {
            unreachable!()
        };
        assert!(agent.apply_update(update.clone()).await);
        let mut bumped = update.clone();
        bumped.version = Some(2);
        assert!(!agent.apply_update(bumped).await);
        assert_eq!(agent.last_known_good().unwrap().version, Some(2));

        let mut loosened = update;
        loosened.is_blocking = false;
        assert!(agent.apply_update(loosened).await);
        assert_eq!(surface.snapshot().applied.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_rules_are_installed_on_resend() {
        let surface = Arc::new(MemorySurface::new("chrome"));
        surface.refuse_next_rules(1);
        let (mut agent, _tx) = agent_with(surface.clone());

        let Message::UpdateBlockedDomains(update) = blocking_update(1) else {
            unreachable!()
        };
        assert!(agent.apply_update(update.clone()).await);
        assert!(surface.snapshot().applied.is_empty());
        // Guardian keeps enforcing meanwhile
        assert_eq!(
            agent.on_navigation(1, "https://example.com/").await,
            Enforcement::Redirected
        );

        let mut resent = update.clone();
        resent.version = Some(2);
        assert!(agent.apply_update(resent).await);
        assert_eq!(surface.snapshot().applied.len(), 1);

        // Installed now, so the next identical push is a no-op
        let mut again = update;
        again.version = Some(3);
        assert!(!agent.apply_update(again).await);
        assert_eq!(surface.snapshot().applied.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_backoff_and_keeps_rules() {
        let surface = Arc::new(MemorySurface::new("chrome"));
        let (mut agent, tx) = agent_with(surface.clone());
        let cancel = CancellationToken::new();

        let (mut reader, sender) = bridge_end(&tx);
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                agent.run(cancel).await;
                agent
            })
        };

        assert_eq!(reader.recv().await.unwrap(), Some(Message::GetBlockedDomains));
        sender.send(&blocking_update(1)).await.unwrap();
        let before = next_heartbeat(&mut reader).await;

        // Bridge goes away; connector has nothing to offer for a while
        drop(reader);
        drop(sender);
        let dropped_at = Instant::now();
        tokio::time::sleep(Duration::from_secs(12)).await;

        let (mut reader, _sender) = bridge_end(&tx);
        assert_eq!(reader.recv().await.unwrap(), Some(Message::GetBlockedDomains));
        assert!(dropped_at.elapsed() >= Duration::from_secs(12));

        let after = next_heartbeat(&mut reader).await;
        assert!(after.sequence > before.sequence);

        cancel.cancel();
        let agent = task.await.unwrap();
        assert!(agent.rules().is_blocking());
        assert_eq!(agent.rules().rules().len(), 3);
        assert_eq!(surface.snapshot().applied.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_error_keeps_last_known_good() {
        let surface = Arc::new(MemorySurface::new("firefox"));
        let (mut agent, tx) = agent_with(surface.clone());
        let (mut reader, sender) = bridge_end(&tx);
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                agent.run(cancel).await;
                agent
            })
        };

        assert_eq!(reader.recv().await.unwrap(), Some(Message::GetBlockedDomains));
        sender.send(&blocking_update(1)).await.unwrap();
        sender
            .send(&Message::error("configuration unavailable"))
            .await
            .unwrap();
        next_heartbeat(&mut reader).await;
        next_heartbeat(&mut reader).await;

        cancel.cancel();
        let agent = task.await.unwrap();
        assert!(agent.rules().is_blocking());
        assert_eq!(
            agent.on_navigation(1, "https://example.com/").await,
            Enforcement::Redirected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_violation_ends_session() {
        use tokio::io::AsyncWriteExt;

        let surface = Arc::new(MemorySurface::new("chrome"));
        let (mut agent, _tx) = agent_with(surface);
        let (agent_side, mut bridge_side) = tokio::io::duplex(1024);
        bridge_side.write_all(&0u32.to_ne_bytes()).await.unwrap();

        let end = agent
            .run_session(agent_side, &CancellationToken::new())
            .await;
        assert_eq!(end, SessionEnd::ProtocolViolation);
    }
}
