//! Durable heartbeat records
//!
//! Layout under `<state_dir>/liveness/`:
//!
//! ```text
//! agents/<agentKind>--<profileId>.json   latest heartbeat per (kind, profile)
//! <agentKind>.json                       legacy combined record per kind
//! ```
//!
//! Only the latest record is kept. Whether an agent is alive is decided by the
//! consumer from the timestamp, not from the file existing.

use crate::error::Result;
use crate::persist::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const LIVENESS_DIR: &str = "liveness";
const AGENTS_DIR: &str = "agents";
const MAX_COMPONENT_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRecord {
    pub agent_kind: String,
    pub profile_id: String,
    pub sequence: u64,
    /// When the agent sent the heartbeat
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub window_count: u32,
    #[serde(default)]
    pub incognito_allowed: bool,
    /// When the bridge stored it
    pub received_at: DateTime<Utc>,
}

impl HeartbeatRecord {
    /// Age of the agent-side timestamp at `now`, never negative
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.timestamp).max(chrono::Duration::zero())
    }
}

#[derive(Debug, Clone)]
pub struct LivenessStore {
    dir: PathBuf,
}

impl LivenessStore {
    pub fn new(state_dir: &Path) -> Self {
        LivenessStore {
            dir: state_dir.join(LIVENESS_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn agent_path(&self, agent_kind: &str, profile_id: &str) -> PathBuf {
        self.dir.join(AGENTS_DIR).join(format!(
            "{}--{}.json",
            sanitize(agent_kind),
            sanitize(profile_id)
        ))
    }

    pub fn legacy_path(&self, agent_kind: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(agent_kind)))
    }

    /// Overwrite the per-pair record and the legacy per-kind record
    pub fn record(&self, heartbeat: &HeartbeatRecord) -> Result<()> {
        write_json_atomic(
            &self.agent_path(&heartbeat.agent_kind, &heartbeat.profile_id),
            heartbeat,
        )?;
        write_json_atomic(&self.legacy_path(&heartbeat.agent_kind), heartbeat)
    }

    pub fn load(&self, agent_kind: &str, profile_id: &str) -> Result<Option<HeartbeatRecord>> {
        read_json(&self.agent_path(agent_kind, profile_id))
    }

    pub fn load_legacy(&self, agent_kind: &str) -> Result<Option<HeartbeatRecord>> {
        read_json(&self.legacy_path(agent_kind))
    }

    /// Every per-pair record, sorted by kind then profile. Corrupt files are skipped.
    pub fn load_all(&self) -> Result<Vec<HeartbeatRecord>> {
        let entries = match fs::read_dir(self.dir.join(AGENTS_DIR)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<HeartbeatRecord>(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable heartbeat record"),
            }
        }
        records.sort_by(|a, b| {
            (a.agent_kind.as_str(), a.profile_id.as_str())
                .cmp(&(b.agent_kind.as_str(), b.profile_id.as_str()))
        });
        Ok(records)
    }
}

/// Make an agent-supplied string safe to use as a file name component
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_COMPONENT_LEN)
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn heartbeat(kind: &str, profile: &str, sequence: u64) -> HeartbeatRecord {
        let now = Utc::now();
        HeartbeatRecord {
            agent_kind: kind.into(),
            profile_id: profile.into(),
            sequence,
            timestamp: now,
            window_count: 2,
            incognito_allowed: true,
            received_at: now,
        }
    }

    #[test]
    fn test_record_writes_pair_and_legacy() {
        let dir = tempdir().unwrap();
        let store = LivenessStore::new(dir.path());

        store.record(&heartbeat("chrome", "p1", 1)).unwrap();
        store.record(&heartbeat("chrome", "p1", 2)).unwrap();
        store.record(&heartbeat("chrome", "p2", 9)).unwrap();

        assert_eq!(store.load("chrome", "p1").unwrap().unwrap().sequence, 2);
        assert_eq!(store.load_legacy("chrome").unwrap().unwrap().profile_id, "p2");

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].profile_id, "p1");
        assert_eq!(all[1].profile_id, "p2");
    }

    #[test]
    fn test_hostile_names_stay_inside_dir() {
        let dir = tempdir().unwrap();
        let store = LivenessStore::new(dir.path());
        let path = store.agent_path("../../etc", "a/b\\c");
        assert!(path.starts_with(store.dir()));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "______etc--a_b_c.json"
        );
        assert!(store.legacy_path("").ends_with("unknown.json"));
    }

    #[test]
    fn test_load_all_skips_corrupt() {
        let dir = tempdir().unwrap();
        let store = LivenessStore::new(dir.path());
        store.record(&heartbeat("firefox", "p1", 1)).unwrap();
        fs::write(store.dir().join(AGENTS_DIR).join("junk.json"), b"nope").unwrap();

        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_load_all_empty_when_missing() {
        let dir = tempdir().unwrap();
        assert!(LivenessStore::new(dir.path()).load_all().unwrap().is_empty());
    }

    #[test]
    fn test_age_is_never_negative() {
        let record = heartbeat("chrome", "p1", 1);
        assert_eq!(record.age(record.timestamp - Duration::seconds(5)), Duration::zero());
        assert_eq!(
            record.age(record.timestamp + Duration::seconds(5)),
            Duration::seconds(5)
        );
    }
}
