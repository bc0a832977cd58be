//! Rule derivation and navigation verdicts
//!
//! Each blocked domain expands into three rules, mirroring how browsers
//! express declarative redirects: the bare domain, its `www.` variant and a
//! wildcard over every subdomain. URL exceptions are consulted before any
//! block is applied.

use serde::Serialize;
use std::fmt;
use steadfast_core_config::UrlException;
use steadfast_core_lock::ProtectionLevel;
use steadfast_proto::BlockedDomainsUpdate;
use url::{Host, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Exact,
    Www,
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockRule {
    pub domain: String,
    pub kind: RuleKind,
}

impl BlockRule {
    /// Host pattern as a browser rule would spell it
    pub fn pattern(&self) -> String {
        match self.kind {
            RuleKind::Exact => self.domain.clone(),
            RuleKind::Www => format!("www.{}", self.domain),
            RuleKind::Wildcard => format!("*.{}", self.domain),
        }
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.');
        match self.kind {
            RuleKind::Exact => host == self.domain,
            RuleKind::Www => host.strip_prefix("www.") == Some(self.domain.as_str()),
            RuleKind::Wildcard => host
                .strip_suffix(self.domain.as_str())
                .is_some_and(|head| head.len() > 1 && head.ends_with('.')),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Host matched a domain rule
    Domain(String),
    /// Host is a dotted-quad IPv4 literal
    IpLiteral,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Domain(domain) => write!(f, "blocked domain {}", domain),
            BlockReason::IpLiteral => write!(f, "IP literal navigation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Host is blocked but the path is under an allowed prefix
    AllowedByException,
    Block(BlockReason),
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Block(_))
    }
}

/// Locally applied restriction rules derived from one configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<BlockRule>,
    exceptions: Vec<UrlException>,
    is_blocking: bool,
    level: ProtectionLevel,
}

impl RuleSet {
    pub fn derive(update: &BlockedDomainsUpdate) -> Self {
        let rules = update
            .domains
            .iter()
            .flat_map(|domain| {
                [RuleKind::Exact, RuleKind::Www, RuleKind::Wildcard].map(|kind| BlockRule {
                    domain: domain.clone(),
                    kind,
                })
            })
            .collect();

        RuleSet {
            rules,
            exceptions: update.url_exceptions.clone(),
            is_blocking: update.is_blocking,
            level: update.protection_level.unwrap_or_default(),
        }
    }

    pub fn rules(&self) -> &[BlockRule] {
        &self.rules
    }

    pub fn exceptions(&self) -> &[UrlException] {
        &self.exceptions
    }

    pub fn is_blocking(&self) -> bool {
        self.is_blocking
    }

    pub fn protection_level(&self) -> ProtectionLevel {
        self.level
    }

    pub fn evaluate(&self, url: &str) -> Verdict {
        if !self.is_blocking {
            return Verdict::Allow;
        }
        let Ok(parsed) = Url::parse(url) else {
            return Verdict::Allow;
        };
        if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
            return Verdict::Allow;
        }
        let Some(host) = parsed.host() else {
            return Verdict::Allow;
        };
        let host_str = match &host {
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        };

        if self
            .exceptions
            .iter()
            .any(|e| e.allows(&host_str, parsed.path()))
        {
            return Verdict::AllowedByException;
        }

        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(&host_str)) {
            return Verdict::Block(BlockReason::Domain(rule.domain.clone()));
        }

        if matches!(host, Host::Ipv4(_)) {
            return Verdict::Block(BlockReason::IpLiteral);
        }

        Verdict::Allow
    }
}
