/*!
 * Settings for the authority, bridge and agents
 *
 * Intervals here are system parameters, not hidden constants: the config poll
 * interval is the upper bound on how long a published change takes to reach
 * an agent.
 */

use crate::error::{Result, SteadfastError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use steadfast_agent::AgentSettings;
use steadfast_core_lock::ProtectionLevel;
use steadfast_proto::DEFAULT_MAX_FRAME_BYTES;

const APP_DIR: &str = "steadfast";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding the published config, lock record, lease and liveness files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// How often readers check the version stamp
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often agents send a heartbeat
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Wait between reconnect attempts after losing the bridge
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Authority lock tick
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Heartbeat age after which an agent counts as stale
    #[serde(default = "default_agent_stale_after_secs")]
    pub agent_stale_after_secs: u64,

    /// Largest accepted frame body
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Anti-tamper feature gate; changed only by `steadfast protection`
    #[serde(default)]
    pub protection_level: ProtectionLevel,

    /// Program and arguments launched when an agent sends `openApp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_command: Option<Vec<String>>,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            agent_stale_after_secs: default_agent_stale_after_secs(),
            max_frame_bytes: default_max_frame_bytes(),
            protection_level: ProtectionLevel::default(),
            app_command: None,
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_heartbeat_interval_ms() -> u64 {
    2000
}

fn default_reconnect_backoff_ms() -> u64 {
    5000
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_agent_stale_after_secs() -> u64 {
    10
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

/// Logging verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl Settings {
    /// `<config_dir>/steadfast/settings.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SteadfastError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            SteadfastError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| SteadfastError::Config(format!("Failed to serialize settings: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// An explicit path must exist; a missing default file means defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reject values that would make the loops spin or the channel useless
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("reconnect_backoff_ms", self.reconnect_backoff_ms),
            ("tick_interval_ms", self.tick_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(SteadfastError::Config(format!("{} must be greater than 0", name)));
            }
        }
        if self.agent_stale_after_secs == 0 {
            return Err(SteadfastError::Config(
                "agent_stale_after_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_frame_bytes == 0 || self.max_frame_bytes > u32::MAX as usize {
            return Err(SteadfastError::Config(format!(
                "max_frame_bytes must be between 1 and {}",
                u32::MAX
            )));
        }
        if let Some(argv) = &self.app_command {
            if argv.first().map_or(true, |program| program.trim().is_empty()) {
                return Err(SteadfastError::Config(
                    "app_command must name a program".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn agent_stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.agent_stale_after_secs as i64)
    }

    /// Loop settings for an enforcement agent
    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            heartbeat_interval: self.heartbeat_interval(),
            poll_interval: self.poll_interval(),
            reconnect_backoff: self.reconnect_backoff(),
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}
