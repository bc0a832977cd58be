//! The bridge serving an agent over an in-memory duplex channel

use chrono::{TimeZone, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use steadfast::bridge::{Bridge, BridgeExit, Launcher};
use steadfast::Settings;
use steadfast_core_config::{AuthorityLease, BlockConfiguration, ConfigStore, LivenessStore};
use steadfast_proto::{split, BlockedDomainsUpdate, FrameReader, Heartbeat, Message, STATUS_OK};
use tempfile::tempdir;
use tokio::io::{duplex, AsyncRead, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const MAX: usize = 64 * 1024;

#[derive(Default, Clone)]
struct CountingLauncher(Arc<AtomicUsize>);

impl Launcher for CountingLauncher {
    fn launch(&self) -> std::io::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn settings(dir: &Path, poll_interval_ms: u64) -> Settings {
    Settings {
        state_dir: dir.to_path_buf(),
        poll_interval_ms,
        max_frame_bytes: MAX,
        ..Default::default()
    }
}

fn publish(dir: &Path, lease: &AuthorityLease, domains: &[&str]) -> u64 {
    let mut config = BlockConfiguration {
        is_blocking: true,
        ..Default::default()
    };
    config.add_domains(domains.iter().copied()).unwrap();
    ConfigStore::new(dir)
        .publish(lease, &config, Utc::now())
        .unwrap()
}

async fn next_update<R: AsyncRead + Unpin>(reader: &mut FrameReader<R>) -> BlockedDomainsUpdate {
    let pushed = timeout(Duration::from_secs(5), reader.recv())
        .await
        .expect("push within the poll interval")
        .unwrap();
    let Some(Message::UpdateBlockedDomains(update)) = pushed else {
        panic!("expected a pushed update");
    };
    update
}

#[tokio::test]
async fn test_duplex_session() {
    let dir = tempdir().unwrap();
    let lease = AuthorityLease::acquire(dir.path()).unwrap();
    publish(dir.path(), &lease, &["example.com"]);

    let (agent_side, bridge_side) = duplex(MAX);
    let launcher = CountingLauncher::default();
    let mut bridge = Bridge::new(&settings(dir.path(), 2000), launcher.clone());
    let cancel = CancellationToken::new();
    let session = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let (reader, sender) = split(bridge_side, MAX);
            bridge.serve(reader, sender, cancel).await
        })
    };
    let (mut from_bridge, to_bridge) = split(agent_side, MAX);

    to_bridge.send(&Message::GetBlockedDomains).await.unwrap();
    let Some(Message::UpdateBlockedDomains(update)) = from_bridge.recv().await.unwrap() else {
        panic!("expected the blocked domains");
    };
    assert_eq!(update.domains, vec!["example.com".to_string()]);
    assert_eq!(update.version, Some(1));

    let timestamp = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
    to_bridge
        .send(&Message::Heartbeat(Heartbeat {
            agent_kind: "firefox".to_string(),
            timestamp,
            incognito_allowed: true,
            window_count: 3,
            profile_id: "profile-a".to_string(),
            sequence: 7,
        }))
        .await
        .unwrap();
    let Some(Message::HeartbeatAck(ack)) = from_bridge.recv().await.unwrap() else {
        panic!("expected a heartbeat ack");
    };
    assert_eq!(ack.status, STATUS_OK);

    let stored = LivenessStore::new(dir.path())
        .load("firefox", "profile-a")
        .unwrap()
        .unwrap();
    assert_eq!(stored.sequence, 7);
    assert_eq!(stored.window_count, 3);
    assert_eq!(stored.timestamp, timestamp);

    to_bridge.send(&Message::OpenApp).await.unwrap();
    assert_eq!(from_bridge.recv().await.unwrap(), Some(Message::OpenAppAck));
    assert_eq!(launcher.0.load(Ordering::SeqCst), 1);

    // A well-framed message of the wrong kind is answered, not fatal
    to_bridge.send_value(&serde_json::json!({"type": "reboot"})).await.unwrap();
    assert!(matches!(
        from_bridge.recv().await.unwrap(),
        Some(Message::Error(_))
    ));

    cancel.cancel();
    assert_eq!(session.await.unwrap(), BridgeExit::Cancelled);
}

#[tokio::test]
async fn test_published_changes_are_pushed() {
    let dir = tempdir().unwrap();
    let lease = AuthorityLease::acquire(dir.path()).unwrap();
    publish(dir.path(), &lease, &["example.com"]);

    let (agent_side, bridge_side) = duplex(MAX);
    let mut bridge = Bridge::new(&settings(dir.path(), 50), CountingLauncher::default());
    let cancel = CancellationToken::new();
    let session = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let (reader, sender) = split(bridge_side, MAX);
            bridge.serve(reader, sender, cancel).await
        })
    };
    let (mut from_bridge, _to_bridge) = split(agent_side, MAX);

    // Nobody asked yet, the first poll still delivers the current record
    let first = next_update(&mut from_bridge).await;
    assert_eq!(first.version, Some(1));

    publish(dir.path(), &lease, &["example.com", "news.example"]);
    let second = next_update(&mut from_bridge).await;
    assert_eq!(second.version, Some(2));
    assert_eq!(second.domains.len(), 2);

    cancel.cancel();
    assert_eq!(session.await.unwrap(), BridgeExit::Cancelled);
}

#[tokio::test]
async fn test_oversized_frame_tears_down_channel() {
    let dir = tempdir().unwrap();
    let (mut agent_side, bridge_side) = duplex(MAX);
    let mut bridge = Bridge::new(&settings(dir.path(), 2000), CountingLauncher::default());
    let session = tokio::spawn(async move {
        let (reader, sender) = split(bridge_side, MAX);
        bridge.serve(reader, sender, CancellationToken::new()).await
    });

    agent_side
        .write_all(&((MAX as u32) + 1).to_ne_bytes())
        .await
        .unwrap();
    agent_side.flush().await.unwrap();

    let exit = timeout(Duration::from_secs(5), session).await.unwrap().unwrap();
    assert_eq!(exit, BridgeExit::ProtocolViolation);
}

#[tokio::test]
async fn test_agent_hangup_ends_session() {
    let dir = tempdir().unwrap();
    let (agent_side, bridge_side) = duplex(MAX);
    let mut bridge = Bridge::new(&settings(dir.path(), 2000), CountingLauncher::default());
    let session = tokio::spawn(async move {
        let (reader, sender) = split(bridge_side, MAX);
        bridge.serve(reader, sender, CancellationToken::new()).await
    });

    drop(agent_side);
    let exit = timeout(Duration::from_secs(5), session).await.unwrap().unwrap();
    assert_eq!(exit, BridgeExit::EndOfStream);
}

#[tokio::test]
async fn test_one_shot_mode_answers_once() {
    let dir = tempdir().unwrap();
    let (agent_side, bridge_side) = duplex(MAX);
    let mut bridge = Bridge::new(&settings(dir.path(), 2000), CountingLauncher::default());
    let (mut from_bridge, to_bridge) = split(agent_side, MAX);

    to_bridge.send(&Message::GetBlockedDomains).await.unwrap();
    let (reader, sender) = split(bridge_side, MAX);
    bridge.serve_once(reader, sender).await.unwrap();

    // Nothing has been published yet
    let Some(Message::Error(error)) = from_bridge.recv().await.unwrap() else {
        panic!("expected an error reply");
    };
    assert_eq!(error.message, "configuration unavailable");
}
