//! Navigation Guardian
//!
//! While blocking is active, navigations to browser self-management pages
//! (extension and settings screens) are sent to the blocked page, since those
//! are where a user would go to switch enforcement off. Pages served by the
//! agent itself are always allowed. When a redirect cannot be applied the
//! page is closed instead.

use crate::rules::{BlockReason, RuleSet, Verdict};
use crate::surface::{BrowserSurface, PageId};
use tracing::{error, info, warn};
use url::Url;

/// URL prefixes that lead to extension or browser settings management
pub const GUARDED_PREFIXES: &[&str] = &[
    "chrome://extensions",
    "chrome://settings",
    "edge://extensions",
    "edge://settings",
    "brave://extensions",
    "brave://settings",
    "opera://extensions",
    "opera://settings",
    "vivaldi://extensions",
    "vivaldi://settings",
    "about:addons",
    "about:config",
    "about:debugging",
    "about:preferences",
];

const BLOCKED_PAGE: &str = "blocked.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectReason {
    SelfManagement,
    Blocked(BlockReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect { to: String, reason: RedirectReason },
}

/// What actually happened to a guarded page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    Allowed,
    Redirected,
    Closed,
    /// Neither redirect nor close worked
    Failed,
}

#[derive(Debug, Clone)]
pub struct NavigationGuardian {
    own_origin: String,
}

impl NavigationGuardian {
    /// `own_origin` is the agent's extension origin, e.g. `chrome-extension://abc`
    pub fn new(own_origin: impl Into<String>) -> Self {
        NavigationGuardian {
            own_origin: own_origin.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn is_guarded(url: &str) -> bool {
        let url = url.trim().to_ascii_lowercase();
        GUARDED_PREFIXES.iter().any(|prefix| url.starts_with(prefix))
    }

    pub fn is_own_page(&self, url: &str) -> bool {
        url.strip_prefix(self.own_origin.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Where blocked navigations land, carrying the original target
    pub fn blocked_page_url(&self, original: &str) -> String {
        let base = format!("{}/{}", self.own_origin, BLOCKED_PAGE);
        match Url::parse(&base) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("url", original);
                url.to_string()
            }
            Err(_) => base,
        }
    }

    pub fn decide(&self, rules: &RuleSet, url: &str) -> GuardDecision {
        if self.is_own_page(url) {
            return GuardDecision::Allow;
        }

        if rules.is_blocking() && Self::is_guarded(url) {
            return GuardDecision::Redirect {
                to: self.blocked_page_url(url),
                reason: RedirectReason::SelfManagement,
            };
        }

        match rules.evaluate(url) {
            Verdict::Block(reason) => GuardDecision::Redirect {
                to: self.blocked_page_url(url),
                reason: RedirectReason::Blocked(reason),
            },
            Verdict::Allow | Verdict::AllowedByException => GuardDecision::Allow,
        }
    }

    /// Apply the decision for `url` on `page`, closing the page if redirecting fails
    pub async fn enforce<S>(&self, surface: &S, rules: &RuleSet, page: PageId, url: &str) -> Enforcement
    where
        S: BrowserSurface + ?Sized,
    {
        let (to, reason) = match self.decide(rules, url) {
            GuardDecision::Allow => return Enforcement::Allowed,
            GuardDecision::Redirect { to, reason } => (to, reason),
        };

        match &reason {
            RedirectReason::SelfManagement => warn!(
                agent_kind = surface.agent_kind(),
                page,
                url,
                "TamperSuspected: self-management page opened while blocking"
            ),
            RedirectReason::Blocked(why) => info!(page, url, reason = %why, "Navigation blocked"),
        }

        match surface.redirect(page, &to).await {
            Ok(()) => Enforcement::Redirected,
            Err(e) => {
                warn!(page, error = %e, "Redirect failed, closing page");
                match surface.close(page).await {
                    Ok(()) => Enforcement::Closed,
                    Err(e) => {
                        error!(page, error = %e, "Failed to close guarded page");
                        Enforcement::Failed
                    }
                }
            }
        }
    }
}
