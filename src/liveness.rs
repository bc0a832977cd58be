//! Liveness judgement over stored heartbeat records
//!
//! The bridge only stores the latest heartbeat per agent. The authority reads
//! those records on every sweep and decides, from timestamp recency, whether
//! each agent is alive. A sequence that goes backwards means the agent
//! restarted and starts a new liveness epoch; forward gaps are normal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use steadfast_core_config::{HeartbeatRecord, LivenessStore};
use steadfast_core_lock::{Capability, ProtectionLevel};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentHealth {
    Alive,
    Stale,
}

impl fmt::Display for AgentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentHealth::Alive => write!(f, "alive"),
            AgentHealth::Stale => write!(f, "stale"),
        }
    }
}

/// What a single heartbeat meant for its agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    FirstSeen,
    Continued,
    /// The agent restarted; its sequence went back
    NewEpoch { previous_sequence: u64 },
    /// Same record as last time
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLiveness {
    pub agent_kind: String,
    pub profile_id: String,
    pub last_sequence: u64,
    pub last_timestamp: DateTime<Utc>,
    pub epoch: u32,
    pub epoch_started_at: DateTime<Utc>,
    pub window_count: u32,
    pub incognito_allowed: bool,
}

/// One row of `steadfast agents`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReport {
    pub agent_kind: String,
    pub profile_id: String,
    pub sequence: u64,
    pub epoch: u32,
    pub age_secs: i64,
    pub health: AgentHealth,
    pub window_count: u32,
    pub incognito_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TamperReason {
    Stale { age_secs: i64 },
    IncognitoNotAllowed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TamperAlert {
    pub agent_kind: String,
    pub profile_id: String,
    pub reason: TamperReason,
}

impl fmt::Display for TamperAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            TamperReason::Stale { age_secs } => write!(
                f,
                "{} agent {} has not reported for {}s",
                self.agent_kind, self.profile_id, age_secs
            ),
            TamperReason::IncognitoNotAllowed => write!(
                f,
                "{} agent {} is not allowed in private windows",
                self.agent_kind, self.profile_id
            ),
        }
    }
}

type AgentKey = (String, String);

#[derive(Debug, Clone)]
pub struct LivenessTracker {
    stale_after: Duration,
    agents: BTreeMap<AgentKey, AgentLiveness>,
}

impl LivenessTracker {
    pub fn new(stale_after: Duration) -> Self {
        LivenessTracker {
            stale_after,
            agents: BTreeMap::new(),
        }
    }

    pub fn get(&self, agent_kind: &str, profile_id: &str) -> Option<&AgentLiveness> {
        self.agents
            .get(&(agent_kind.to_string(), profile_id.to_string()))
    }

    pub fn observe(&mut self, heartbeat: &HeartbeatRecord) -> Observation {
        let key = (heartbeat.agent_kind.clone(), heartbeat.profile_id.clone());
        let Some(agent) = self.agents.get_mut(&key) else {
            info!(
                agent_kind = %heartbeat.agent_kind,
                profile_id = %heartbeat.profile_id,
                sequence = heartbeat.sequence,
                "agent seen"
            );
            self.agents.insert(
                key,
                AgentLiveness {
                    agent_kind: heartbeat.agent_kind.clone(),
                    profile_id: heartbeat.profile_id.clone(),
                    last_sequence: heartbeat.sequence,
                    last_timestamp: heartbeat.timestamp,
                    epoch: 1,
                    epoch_started_at: heartbeat.timestamp,
                    window_count: heartbeat.window_count,
                    incognito_allowed: heartbeat.incognito_allowed,
                },
            );
            return Observation::FirstSeen;
        };

        let restarted = heartbeat.sequence < agent.last_sequence
            || (heartbeat.sequence == agent.last_sequence
                && heartbeat.timestamp > agent.last_timestamp);
        let observation = if restarted {
            let previous_sequence = agent.last_sequence;
            agent.epoch += 1;
            agent.epoch_started_at = heartbeat.timestamp;
            info!(
                agent_kind = %agent.agent_kind,
                profile_id = %agent.profile_id,
                previous_sequence,
                sequence = heartbeat.sequence,
                epoch = agent.epoch,
                "agent restarted, new liveness epoch"
            );
            Observation::NewEpoch { previous_sequence }
        } else if heartbeat.sequence == agent.last_sequence {
            return Observation::Duplicate;
        } else {
            // Sweeps sample only the latest stored record, so a forward gap
            // is expected and keeps the epoch
            if heartbeat.sequence > agent.last_sequence + 1 {
                debug!(
                    agent_kind = %agent.agent_kind,
                    skipped = heartbeat.sequence - agent.last_sequence - 1,
                    "heartbeat sequence gap"
                );
            }
            Observation::Continued
        };

        agent.last_sequence = heartbeat.sequence;
        agent.last_timestamp = heartbeat.timestamp;
        agent.window_count = heartbeat.window_count;
        agent.incognito_allowed = heartbeat.incognito_allowed;
        observation
    }

    /// Fold every stored record into the tracker
    pub fn sweep(&mut self, store: &LivenessStore) -> steadfast_core_config::Result<usize> {
        let records = store.load_all()?;
        let mut changed = 0;
        for record in &records {
            if self.observe(record) != Observation::Duplicate {
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub fn health(&self, agent: &AgentLiveness, now: DateTime<Utc>) -> AgentHealth {
        if age(agent, now) <= self.stale_after {
            AgentHealth::Alive
        } else {
            AgentHealth::Stale
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<AgentReport> {
        self.agents
            .values()
            .map(|agent| AgentReport {
                agent_kind: agent.agent_kind.clone(),
                profile_id: agent.profile_id.clone(),
                sequence: agent.last_sequence,
                epoch: agent.epoch,
                age_secs: age(agent, now).num_seconds(),
                health: self.health(agent, now),
                window_count: agent.window_count,
                incognito_allowed: agent.incognito_allowed,
            })
            .collect()
    }

    /// Agents that look disabled, given the capabilities `level` enables
    pub fn tamper_alerts(
        &self,
        now: DateTime<Utc>,
        level: ProtectionLevel,
        is_blocking: bool,
    ) -> Vec<TamperAlert> {
        if !is_blocking {
            return Vec::new();
        }
        let mut alerts = Vec::new();
        for agent in self.agents.values() {
            if level.enables(Capability::StaleAgentAlerts)
                && self.health(agent, now) == AgentHealth::Stale
            {
                alerts.push(TamperAlert {
                    agent_kind: agent.agent_kind.clone(),
                    profile_id: agent.profile_id.clone(),
                    reason: TamperReason::Stale {
                        age_secs: age(agent, now).num_seconds(),
                    },
                });
            }
            if level.enables(Capability::IncognitoRequired) && !agent.incognito_allowed {
                alerts.push(TamperAlert {
                    agent_kind: agent.agent_kind.clone(),
                    profile_id: agent.profile_id.clone(),
                    reason: TamperReason::IncognitoNotAllowed,
                });
            }
        }
        alerts
    }
}

fn age(agent: &AgentLiveness, now: DateTime<Utc>) -> Duration {
    (now - agent.last_timestamp).max(Duration::zero())
}
