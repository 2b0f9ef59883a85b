//! Security audit event taxonomy and utility functions.
//!
//! Lives in `core` so the persistence layer, the API server and background
//! jobs agree on event names and severities.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a security audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Event type constants
// ---------------------------------------------------------------------------

/// Known event types for security audit entries.
pub mod event_types {
    pub const LOGIN_SUCCESS: &str = "login_success";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const BRUTE_FORCE_DETECTED: &str = "brute_force_detected";
    pub const TOKEN_ISSUED: &str = "token_issued";
    pub const TOKEN_REFRESHED: &str = "token_refreshed";
    pub const TOKEN_REFRESH_FAILED: &str = "token_refresh_failed";
    pub const TOKEN_REUSE_DETECTED: &str = "token_reuse_detected";
    pub const TOKEN_REVOKED: &str = "token_revoked";
    pub const ALL_TOKENS_REVOKED: &str = "all_tokens_revoked";
    pub const DEVICE_CAP_ENFORCED: &str = "device_cap_enforced";
    pub const INVALID_TOKEN_SIGNATURE: &str = "invalid_token_signature";
    pub const SUSPICIOUS_ACTIVITY: &str = "suspicious_activity";
    pub const PRIVILEGE_ESCALATION: &str = "privilege_escalation";
    pub const DATA_ACCESS: &str = "data_access";
}

/// Default severity for a known event type.
///
/// Unknown event types default to [`Severity::Info`].
pub fn default_severity(event_type: &str) -> Severity {
    match event_type {
        event_types::TOKEN_REUSE_DETECTED | event_types::PRIVILEGE_ESCALATION => {
            Severity::Critical
        }
        event_types::LOGIN_FAILED
        | event_types::BRUTE_FORCE_DETECTED
        | event_types::TOKEN_REFRESH_FAILED
        | event_types::ALL_TOKENS_REVOKED
        | event_types::INVALID_TOKEN_SIGNATURE
        | event_types::SUSPICIOUS_ACTIVITY => Severity::Warning,
        _ => Severity::Info,
    }
}

// ---------------------------------------------------------------------------
// Sensitive field redaction
// ---------------------------------------------------------------------------

/// Fields that must never be stored in audit metadata.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api_key",
    "private_key",
    "authorization",
    "credential",
    "cookie",
];

/// Redact sensitive fields from a JSON value, recursively.
///
/// Replaces the value of any key containing one of [`SENSITIVE_FIELDS`] with
/// `"[REDACTED]"`. Keys ending in `_count` or `_id` are kept, so fields like
/// `token_count` and `session_id` survive.
pub fn redact_sensitive_fields(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) {
                    redacted.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    redacted.insert(key.clone(), redact_sensitive_fields(val));
                }
            }
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(redact_sensitive_fields).collect())
        }
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    if lower.ends_with("_count") || lower.ends_with("_id") || lower.ends_with("_ids") {
        return false;
    }
    SENSITIVE_FIELDS.iter().any(|f| lower.contains(f))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reuse_detection_is_critical() {
        assert_eq!(
            default_severity(event_types::TOKEN_REUSE_DETECTED),
            Severity::Critical
        );
    }

    #[test]
    fn bulk_revocation_is_warning() {
        assert_eq!(
            default_severity(event_types::ALL_TOKENS_REVOKED),
            Severity::Warning
        );
    }

    #[test]
    fn unknown_event_defaults_to_info() {
        assert_eq!(default_severity("something_else"), Severity::Info);
    }

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn severity_round_trips_through_text() {
        for s in [Severity::Info, Severity::Warning, Severity::Critical] {
            assert_eq!(Severity::parse(s.as_str()), Some(s));
        }
        assert_eq!(Severity::parse("fatal"), None);
    }

    #[test]
    fn redacts_top_level_and_nested_secrets() {
        let input = json!({
            "refresh_token": "abc",
            "session_id": "s-1",
            "nested": { "Password": "hunter2", "device": "phone" },
            "list": [{ "api_key": "k" }]
        });
        let out = redact_sensitive_fields(&input);
        assert_eq!(out["refresh_token"], "[REDACTED]");
        assert_eq!(out["session_id"], "s-1");
        assert_eq!(out["nested"]["Password"], "[REDACTED]");
        assert_eq!(out["nested"]["device"], "phone");
        assert_eq!(out["list"][0]["api_key"], "[REDACTED]");
    }

    #[test]
    fn count_and_id_suffixes_are_kept() {
        let input = json!({ "token_count": 3, "revoked_session_ids": ["a"] });
        let out = redact_sensitive_fields(&input);
        assert_eq!(out["token_count"], 3);
        assert_eq!(out["revoked_session_ids"][0], "a");
    }
}
