//! Control vocabulary: the only way to change the block configuration

use crate::liveness::AgentReport;
use serde::{Deserialize, Serialize};
use steadfast_core_config::UrlException;
use steadfast_core_lock::{Capability, LockSummary, LockTerms, ProtectionLevel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlRequest {
    Status,
    AddDomains { domains: Vec<String> },
    RemoveDomains { domains: Vec<String> },
    AddApps { apps: Vec<String> },
    RemoveApps { apps: Vec<String> },
    AddException { domain: String, paths: Vec<String> },
    RemoveException { domain: String },
    SetBlocking { enabled: bool },
    ActivateLock { terms: LockTerms },
    RequestUnlock {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
    },
    StartBreakableCountdown,
    RemoveLock,
    SetProtection { level: ProtectionLevel },
}

impl ControlRequest {
    /// Requests that weaken the block and are refused while a lock is active
    pub fn loosens(&self) -> bool {
        match self {
            ControlRequest::RemoveDomains { .. }
            | ControlRequest::RemoveApps { .. }
            | ControlRequest::AddException { .. } => true,
            ControlRequest::SetBlocking { enabled } => !enabled,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlRequest::Status => "status",
            ControlRequest::AddDomains { .. } => "addDomains",
            ControlRequest::RemoveDomains { .. } => "removeDomains",
            ControlRequest::AddApps { .. } => "addApps",
            ControlRequest::RemoveApps { .. } => "removeApps",
            ControlRequest::AddException { .. } => "addException",
            ControlRequest::RemoveException { .. } => "removeException",
            ControlRequest::SetBlocking { .. } => "setBlocking",
            ControlRequest::ActivateLock { .. } => "activateLock",
            ControlRequest::RequestUnlock { .. } => "requestUnlock",
            ControlRequest::StartBreakableCountdown => "startBreakableCountdown",
            ControlRequest::RemoveLock => "removeLock",
            ControlRequest::SetProtection { .. } => "setProtection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlResponse {
    Status(StatusReport),
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Denied {
        reason: String,
        /// Text the user has to type back, for RandomText locks
        #[serde(default, skip_serializing_if = "Option::is_none")]
        challenge: Option<String>,
    },
    Error {
        message: String,
    },
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        ControlResponse::Ok {
            message: Some(message.into()),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        ControlResponse::Denied {
            reason: reason.into(),
            challenge: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ControlResponse::Error {
            message: message.into(),
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, ControlResponse::Denied { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub version: Option<u64>,
    pub authority_pid: u32,
    pub is_blocking: bool,
    pub blocked_domains: Vec<String>,
    pub blocked_apps: Vec<String>,
    pub url_exceptions: Vec<UrlException>,
    pub lock: LockSummary,
    pub protection_level: ProtectionLevel,
    pub capabilities: Vec<Capability>,
    pub agents: Vec<AgentReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steadfast_core_lock::TimerLock;

    #[test]
    fn test_request_wire_shape() {
        let request = ControlRequest::AddException {
            domain: "example.com".to_string(),
            paths: vec!["/docs".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"type": "addException", "domain": "example.com", "paths": ["/docs"]})
        );

        let status: ControlRequest = serde_json::from_value(json!({"type": "status"})).unwrap();
        assert_eq!(status, ControlRequest::Status);

        let unlock: ControlRequest =
            serde_json::from_value(json!({"type": "requestUnlock"})).unwrap();
        assert_eq!(unlock, ControlRequest::RequestUnlock { input: None });
    }

    #[test]
    fn test_lock_terms_travel_with_request() {
        let request = ControlRequest::ActivateLock {
            terms: LockTerms::Timer(TimerLock::new(600)),
        };
        let text = serde_json::to_string(&request).unwrap();
        assert_eq!(serde_json::from_str::<ControlRequest>(&text).unwrap(), request);
    }

    #[test]
    fn test_loosening_requests() {
        assert!(ControlRequest::SetBlocking { enabled: false }.loosens());
        assert!(!ControlRequest::SetBlocking { enabled: true }.loosens());
        assert!(ControlRequest::RemoveDomains { domains: vec![] }.loosens());
        assert!(!ControlRequest::RemoveException {
            domain: "example.com".into()
        }
        .loosens());
        assert!(!ControlRequest::AddApps { apps: vec![] }.loosens());
    }

    #[test]
    fn test_denied_response_shape() {
        assert_eq!(
            serde_json::to_value(ControlResponse::denied("locked")).unwrap(),
            json!({"type": "denied", "reason": "locked"})
        );
    }
}
