//! Stable per-profile identity, generated once and persisted

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use steadfast_core_config::persist::{read_json, write_json_atomic};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    pub agent_kind: String,
    pub profile_id: String,
    pub created_at: DateTime<Utc>,
}

impl AgentIdentity {
    pub fn generate(agent_kind: &str) -> Self {
        AgentIdentity {
            agent_kind: agent_kind.to_string(),
            profile_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Load the identity at `path`, creating it on first use.
    ///
    /// An unreadable file is replaced; the authority then sees a new profile.
    pub fn load_or_create(path: &Path, agent_kind: &str) -> Result<Self> {
        match read_json::<AgentIdentity>(path) {
            Ok(Some(identity)) => return Ok(identity),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Replacing unreadable agent identity"),
        }

        let identity = Self::generate(agent_kind);
        write_json_atomic(path, &identity)?;
        info!(agent_kind, profile_id = %identity.profile_id, "Created agent identity");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_identity_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let first = AgentIdentity::load_or_create(&path, "firefox").unwrap();
        let second = AgentIdentity::load_or_create(&path, "firefox").unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first.profile_id).is_ok());
    }

    #[test]
    fn test_corrupt_identity_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, "{").unwrap();

        let identity = AgentIdentity::load_or_create(&path, "chrome").unwrap();
        assert_eq!(identity.agent_kind, "chrome");
        assert_eq!(
            AgentIdentity::load_or_create(&path, "chrome").unwrap(),
            identity
        );
    }
}
