//! What an agent would do with a URL under the published configuration

use crate::error::{Result, SteadfastError};
use serde::Serialize;
use std::path::Path;
use steadfast_agent::{GuardDecision, NavigationGuardian, RedirectReason, RuleSet};
use steadfast_core_config::ConfigStore;
use steadfast_proto::BlockedDomainsUpdate;

/// Origin used for the blocked page in reports
pub const REPORT_ORIGIN: &str = "steadfast://agent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub url: String,
    pub version: u64,
    pub is_blocking: bool,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub fn check_url(state_dir: &Path, url: &str) -> Result<CheckReport> {
    let published = ConfigStore::new(state_dir).read()?.ok_or_else(|| {
        SteadfastError::ConfigUnavailable("no configuration has been published".to_string())
    })?;
    let rules = RuleSet::derive(&BlockedDomainsUpdate::from_published(&published));
    let guardian = NavigationGuardian::new(REPORT_ORIGIN);

    let reason = match guardian.decide(&rules, url) {
        GuardDecision::Allow => None,
        GuardDecision::Redirect {
            reason: RedirectReason::SelfManagement,
            ..
        } => Some("browser management page".to_string()),
        GuardDecision::Redirect {
            reason: RedirectReason::Blocked(why),
            ..
        } => Some(why.to_string()),
    };

    Ok(CheckReport {
        url: url.to_string(),
        version: published.version,
        is_blocking: rules.is_blocking(),
        allowed: reason.is_none(),
        reason,
    })
}
