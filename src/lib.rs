/*!
 * Steadfast - a self-control blocker that holds you to your word
 *
 * The workspace splits into:
 * - `steadfast-core-lock`: commitment locks (Timer, RandomText, Schedule, Restart, Breakable)
 * - `steadfast-core-config`: the published block configuration and liveness records
 * - `steadfast-proto`: the framed JSON channel between browser agents and the bridge
 * - `steadfast-agent`: rule derivation, the navigation guardian and the agent sync loop
 *
 * This crate ties them together: the authority daemon that owns the
 * configuration, the native-messaging bridge, liveness judgement, settings,
 * logging and the `steadfast` CLI.
 *
 * Version: 0.3.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod authority;
pub mod bridge;
pub mod check;
pub mod cli_style;
pub mod config;
pub mod error;
pub mod liveness;
pub mod logging;
pub mod notify;
pub mod output;

// Re-export commonly used types
pub use authority::{Authority, ControlRequest, ControlResponse, StatusReport};
pub use bridge::{Bridge, BridgeExit, CommandLauncher, Launcher};
pub use config::{LogLevel, Settings};
pub use error::{Result, SteadfastError};
pub use liveness::{AgentHealth, AgentReport, LivenessTracker, Observation};
pub use notify::{LogNotifier, MemoryNotifier, Notification, Notifier};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
