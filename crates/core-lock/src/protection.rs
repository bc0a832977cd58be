//! Protection levels: a total order used purely as a feature gate.
//!
//! Each anti-tamper [`Capability`] has a minimum level and is enabled iff the
//! configured level is at least that minimum. The level is changed only by an
//! explicit user action, never by enforcement logic.
//!
//! Guarding browser self-management pages and IP-literal hosts is not listed
//! here: agents do both whenever blocking is active, at any level.

use crate::error::LockError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionLevel {
    None = 0,
    #[default]
    Standard = 1,
    Strict = 2,
    Paranoid = 3,
}

impl ProtectionLevel {
    pub const ALL: [ProtectionLevel; 4] = [
        ProtectionLevel::None,
        ProtectionLevel::Standard,
        ProtectionLevel::Strict,
        ProtectionLevel::Paranoid,
    ];

    pub fn enables(self, capability: Capability) -> bool {
        self >= capability.min_level()
    }

    /// Every capability enabled at this level
    pub fn capabilities(self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|cap| self.enables(*cap))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionLevel::None => "none",
            ProtectionLevel::Standard => "standard",
            ProtectionLevel::Strict => "strict",
            ProtectionLevel::Paranoid => "paranoid",
        }
    }
}

impl fmt::Display for ProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtectionLevel {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "0" => Ok(ProtectionLevel::None),
            "standard" | "1" => Ok(ProtectionLevel::Standard),
            "strict" | "2" => Ok(ProtectionLevel::Strict),
            "paranoid" | "3" => Ok(ProtectionLevel::Paranoid),
            other => Err(LockError::InvalidProtectionLevel(other.to_string())),
        }
    }
}

/// Anti-tamper capabilities gated by [`ProtectionLevel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    /// Refuse the external "lock removed" action
    LockRemovalGuard,
    /// Report enforcement agents whose heartbeats went stale
    StaleAgentAlerts,
    /// Report agents that are not authorized in private/incognito windows
    IncognitoRequired,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::LockRemovalGuard,
        Capability::StaleAgentAlerts,
        Capability::IncognitoRequired,
    ];

    pub fn min_level(self) -> ProtectionLevel {
        match self {
            Capability::LockRemovalGuard => ProtectionLevel::Standard,
            Capability::StaleAgentAlerts => ProtectionLevel::Strict,
            Capability::IncognitoRequired => ProtectionLevel::Paranoid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_totally_ordered() {
        assert!(ProtectionLevel::None < ProtectionLevel::Standard);
        assert!(ProtectionLevel::Standard < ProtectionLevel::Strict);
        assert!(ProtectionLevel::Strict < ProtectionLevel::Paranoid);
        assert_eq!(ProtectionLevel::default(), ProtectionLevel::Standard);
    }

    #[test]
    fn test_capability_gating() {
        assert!(ProtectionLevel::None.capabilities().is_empty());
        assert!(ProtectionLevel::Standard.enables(Capability::LockRemovalGuard));
        assert!(!ProtectionLevel::Standard.enables(Capability::StaleAgentAlerts));
        assert!(ProtectionLevel::Strict.enables(Capability::StaleAgentAlerts));
        assert!(!ProtectionLevel::Strict.enables(Capability::IncognitoRequired));
        assert_eq!(
            ProtectionLevel::Paranoid.capabilities().len(),
            Capability::ALL.len()
        );
    }

    #[test]
    fn test_parse_and_display() {
        for level in ProtectionLevel::ALL {
            assert_eq!(level.to_string().parse::<ProtectionLevel>().unwrap(), level);
        }
        assert_eq!(
            "STRICT".parse::<ProtectionLevel>().unwrap(),
            ProtectionLevel::Strict
        );
        assert!("maximum".parse::<ProtectionLevel>().is_err());
    }
}
