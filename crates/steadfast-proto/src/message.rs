//! Message vocabulary shared by agents and the bridge
//!
//! Every frame is `{"type": <discriminator>, "payload": <object>}`. Messages
//! without data omit `payload`; on input an empty or `null` payload is also
//! accepted for them.

use crate::error::{ProtocolError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use steadfast_core_config::{BlockConfiguration, PublishedConfig, UrlException};
use steadfast_core_lock::{LockSummary, ProtectionLevel};

pub const STATUS_OK: &str = "ok";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Message {
    /// agent → bridge
    GetBlockedDomains,
    /// bridge → agent
    UpdateBlockedDomains(BlockedDomainsUpdate),
    /// agent → bridge
    Heartbeat(Heartbeat),
    /// bridge → agent
    HeartbeatAck(HeartbeatAck),
    /// agent → bridge
    OpenApp,
    /// bridge → agent
    OpenAppAck,
    /// bridge → agent
    Error(ErrorPayload),
}

impl Message {
    /// Interpret a parsed frame body
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let empty_payload = match object.get("payload") {
            Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            _ => false,
        };
        if empty_payload && Self::is_unit_type(object.get("type")) {
            object.remove("payload");
        }
        serde_json::from_value(Value::Object(object))
            .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
    }

    fn is_unit_type(kind: Option<&Value>) -> bool {
        matches!(
            kind.and_then(Value::as_str),
            Some("getBlockedDomains" | "openApp" | "openAppAck")
        )
    }

    /// Wire discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            Message::GetBlockedDomains => "getBlockedDomains",
            Message::UpdateBlockedDomains(_) => "updateBlockedDomains",
            Message::Heartbeat(_) => "heartbeat",
            Message::HeartbeatAck(_) => "heartbeatAck",
            Message::OpenApp => "openApp",
            Message::OpenAppAck => "openAppAck",
            Message::Error(_) => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Message::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn heartbeat_ack() -> Self {
        Message::HeartbeatAck(HeartbeatAck {
            status: STATUS_OK.to_string(),
        })
    }
}

/// Rules an agent should enforce
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedDomainsUpdate {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub is_blocking: bool,
    #[serde(default)]
    pub url_exceptions: Vec<UrlException>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_state: Option<LockSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_level: Option<ProtectionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl BlockedDomainsUpdate {
    pub fn from_config(config: &BlockConfiguration) -> Self {
        BlockedDomainsUpdate {
            domains: config.blocked_domains.iter().cloned().collect(),
            is_blocking: config.is_blocking,
            url_exceptions: config.url_exceptions.clone(),
            lock_state: Some(config.lock_state.clone()),
            protection_level: Some(config.protection_level),
            version: None,
        }
    }

    pub fn from_published(published: &PublishedConfig) -> Self {
        BlockedDomainsUpdate {
            version: Some(published.version),
            ..Self::from_config(&published.config)
        }
    }

    /// Same rules, ignoring the version stamp and lock summary
    pub fn same_rules(&self, other: &BlockedDomainsUpdate) -> bool {
        self.domains == other.domains
            && self.is_blocking == other.is_blocking
            && self.url_exceptions == other.url_exceptions
            && self.protection_level == other.protection_level
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub agent_kind: String,
    /// Milliseconds since the Unix epoch, as browsers report it
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub incognito_allowed: bool,
    #[serde(default)]
    pub window_count: u32,
    pub profile_id: String,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_unit_message_shape() {
        let value = serde_json::to_value(Message::GetBlockedDomains).unwrap();
        assert_eq!(value, json!({"type": "getBlockedDomains"}));
    }

    #[test]
    fn test_unit_message_accepts_empty_payload() {
        for raw in [
            json!({"type": "getBlockedDomains"}),
            json!({"type": "getBlockedDomains", "payload": {}}),
            json!({"type": "getBlockedDomains", "payload": null}),
        ] {
            assert_eq!(Message::from_value(raw).unwrap(), Message::GetBlockedDomains);
        }
        assert_eq!(
            Message::from_value(json!({"type": "openApp", "payload": {}})).unwrap(),
            Message::OpenApp
        );
    }

    #[test]
    fn test_heartbeat_wire_shape() {
        let raw = json!({
            "type": "heartbeat",
            "payload": {
                "agentKind": "chrome",
                "timestamp": 1_709_294_400_000i64,
                "incognitoAllowed": true,
                "windowCount": 3,
                "profileId": "4f7c",
                "sequence": 12
            }
        });
        let Message::Heartbeat(hb) = Message::from_value(raw.clone()).unwrap() else {
            panic!("expected heartbeat");
        };
        assert_eq!(hb.agent_kind, "chrome");
        assert_eq!(hb.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(hb.sequence, 12);
        assert_eq!(serde_json::to_value(Message::Heartbeat(hb)).unwrap(), raw);
    }

    #[test]
    fn test_update_wire_shape() {
        let mut config = BlockConfiguration {
            is_blocking: true,
            ..Default::default()
        };
        config.add_domains(["example.com"]).unwrap();
        config.add_exception("example.com", ["/docs"]).unwrap();

        let msg = Message::UpdateBlockedDomains(BlockedDomainsUpdate::from_config(&config));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "updateBlockedDomains");
        assert_eq!(value["payload"]["domains"], json!(["example.com"]));
        assert_eq!(value["payload"]["isBlocking"], true);
        assert_eq!(
            value["payload"]["urlExceptions"],
            json!([{"domain": "example.com", "allowedPaths": ["/docs"]}])
        );
        assert_eq!(value["payload"]["lockState"]["isLocked"], false);
        assert!(value["payload"].get("version").is_none());
    }

    #[test]
    fn test_same_rules_ignores_version() {
        let a = BlockedDomainsUpdate {
            domains: vec!["a.com".into()],
            is_blocking: true,
            version: Some(1),
            ..Default::default()
        };
        let mut b = a.clone();
        b.version = Some(2);
        assert!(a.same_rules(&b));
        b.is_blocking = false;
        assert!(!a.same_rules(&b));
    }

    #[test]
    fn test_unknown_type_is_invalid_message() {
        let err = Message::from_value(json!({"type": "selfDestruct"})).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
        assert!(!err.is_fatal());

        let err = Message::from_value(json!({"payload": {}})).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_error_and_ack_helpers() {
        assert_eq!(
            serde_json::to_value(Message::error("nope")).unwrap(),
            json!({"type": "error", "payload": {"message": "nope"}})
        );
        assert_eq!(
            serde_json::to_value(Message::heartbeat_ack()).unwrap(),
            json!({"type": "heartbeatAck", "payload": {"status": "ok"}})
        );
        assert_eq!(Message::OpenAppAck.kind(), "openAppAck");
    }
}
