//! Steadfast Agent: turning published configuration into enforcement
//!
//! An enforcement agent lives inside a browser. It keeps a channel to the
//! local bridge, derives redirect rules from every configuration it receives,
//! reports liveness with heartbeats, and guards the browser's own management
//! pages so enforcement cannot be switched off from inside the browser while
//! blocking is active.
//!
//! The browser itself is abstracted behind [`BrowserSurface`] and the way of
//! reaching the bridge behind [`Connector`], so the loop can be driven by a
//! real browser binding or an in-memory one.

pub mod error;
pub mod guardian;
pub mod identity;
pub mod rules;
pub mod surface;
pub mod sync;

pub use error::{AgentError, Result, SurfaceError};
pub use guardian::{Enforcement, GuardDecision, NavigationGuardian, RedirectReason, GUARDED_PREFIXES};
pub use identity::AgentIdentity;
pub use rules::{BlockReason, BlockRule, RuleKind, RuleSet, Verdict};
pub use surface::{BrowserSurface, Connector, MemorySurface, MemoryState, PageId};
pub use sync::{AgentSettings, EnforcementAgent, SessionEnd};
