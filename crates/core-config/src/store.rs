//! ConfigStore (writer side) and ConfigWatcher (reader side)
//!
//! The record lives in `config.json`; its version is mirrored into a tiny
//! `config.stamp` sidecar so readers can detect change without parsing the
//! full record. The record is written before the stamp, so a reader that sees
//! a new stamp always finds a record at least that new.
//!
//! Propagation latency is bounded by the reader's poll interval.

use crate::error::{ConfigError, Result};
use crate::lease::AuthorityLease;
use crate::persist::{read_json, write_bytes_atomic, write_json_atomic};
use crate::record::{BlockConfiguration, PublishedConfig};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const RECORD_FILE: &str = "config.json";
pub const STAMP_FILE: &str = "config.stamp";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ConfigStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    pub fn stamp_path(&self) -> PathBuf {
        self.dir.join(STAMP_FILE)
    }

    /// Version from the stamp sidecar; `None` if nothing was ever published
    pub fn current_version(&self) -> Result<Option<u64>> {
        let path = self.stamp_path();
        match fs::read_to_string(&path) {
            Ok(text) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::corrupt(&path, format!("bad stamp: {}", e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Most recent record and its version; `None` if nothing was ever published
    pub fn read(&self) -> Result<Option<PublishedConfig>> {
        read_json(&self.record_path())
    }

    /// Replace the whole record and bump the version. Only the lease holder may call this.
    pub fn publish(
        &self,
        lease: &AuthorityLease,
        config: &BlockConfiguration,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        if lease.state_dir() != self.dir.as_path() {
            return Err(ConfigError::NotLeaseHolder {
                lease_dir: lease.state_dir().to_path_buf(),
                store_dir: self.dir.clone(),
            });
        }
        lease.verify()?;

        let version = self.next_version()?;
        let record = PublishedConfig {
            version,
            published_at: now,
            config: config.clone(),
        };
        write_json_atomic(&self.record_path(), &record)?;
        write_bytes_atomic(&self.stamp_path(), format!("{}\n", version).as_bytes())?;

        debug!(version, domains = config.blocked_domains.len(), "Configuration published");
        Ok(version)
    }

    fn next_version(&self) -> Result<u64> {
        let from_stamp = match self.current_version() {
            Ok(v) => v.unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable config stamp");
                0
            }
        };
        let from_record = match self.read() {
            Ok(record) => record.map_or(0, |r| r.version),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable config record");
                0
            }
        };
        Ok(from_stamp.max(from_record) + 1)
    }
}

/// Result of one watcher poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A newer record was read; it is now the last-known-good
    Changed(PublishedConfig),
    /// Nothing new since the last poll
    Unchanged,
    /// The store could not be read; keep enforcing the last-known-good
    Unavailable,
}

/// Reader-side change detector that remembers the last good record
#[derive(Debug)]
pub struct ConfigWatcher {
    store: ConfigStore,
    last_stamp: Option<u64>,
    last_good: Option<PublishedConfig>,
    degraded: bool,
}

impl ConfigWatcher {
    pub fn new(store: ConfigStore) -> Self {
        ConfigWatcher {
            store,
            last_stamp: None,
            last_good: None,
            degraded: false,
        }
    }

    pub fn last_good(&self) -> Option<&PublishedConfig> {
        self.last_good.as_ref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn poll(&mut self) -> PollOutcome {
        let stamp = match self.store.current_version() {
            Ok(Some(stamp)) => stamp,
            Ok(None) => return self.unavailable("no configuration has been published"),
            Err(e) => return self.unavailable(&e.to_string()),
        };

        if self.last_stamp == Some(stamp) && self.last_good.is_some() {
            self.recovered();
            return PollOutcome::Unchanged;
        }

        let record = match self.store.read() {
            Ok(Some(record)) => record,
            Ok(None) => return self.unavailable("configuration record is missing"),
            Err(e) => return self.unavailable(&e.to_string()),
        };

        self.last_stamp = Some(stamp);
        self.recovered();

        if self
            .last_good
            .as_ref()
            .is_some_and(|good| good.version == record.version)
        {
            return PollOutcome::Unchanged;
        }

        debug!(version = record.version, "Configuration changed");
        self.last_good = Some(record.clone());
        PollOutcome::Changed(record)
    }

    fn unavailable(&mut self, reason: &str) -> PollOutcome {
        if self.degraded {
            debug!(reason, "Configuration still unavailable");
        } else {
            warn!(
                reason,
                has_last_good = self.last_good.is_some(),
                "Configuration unavailable, keeping last-known-good"
            );
            self.degraded = true;
        }
        PollOutcome::Unavailable
    }

    fn recovered(&mut self) {
        if self.degraded {
            info!("Configuration available again");
            self.degraded = false;
        }
    }
}
