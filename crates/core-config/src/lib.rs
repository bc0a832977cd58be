//! Steadfast Core Config: the shared configuration authority
//!
//! One process (the holder of the [`AuthorityLease`]) owns the
//! [`BlockConfiguration`] and publishes it through a [`ConfigStore`]. Any
//! number of reader processes observe it with a [`ConfigWatcher`], which
//! compares a cheap version stamp before re-reading the record and keeps the
//! last-known-good copy when the store is unreadable.
//!
//! Every file is replaced whole via temp file and rename, so readers never
//! observe a partially written record.
//!
//! [`LivenessStore`] holds the latest heartbeat per agent in the same state
//! directory.

pub mod domain;
pub mod error;
pub mod lease;
pub mod liveness;
pub mod persist;
pub mod record;
pub mod store;

pub use domain::{host_matches, normalize_domain, normalize_path_prefix};
pub use error::{ConfigError, Result};
pub use lease::AuthorityLease;
pub use liveness::{HeartbeatRecord, LivenessStore};
pub use record::{BlockConfiguration, PublishedConfig, UrlException};
pub use store::{ConfigStore, ConfigWatcher, PollOutcome};
