//! Security audit event model. Immutable once created (no updated_at).

use haven_core::security_events::Severity;
use haven_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `security_audit_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SecurityAuditEvent {
    pub id: DbId,
    pub user_id: Option<DbId>,
    pub event_type: String,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_path: Option<String>,
    pub request_method: Option<String>,
    /// One of `info`, `warning`, `critical`.
    pub severity: String,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

impl SecurityAuditEvent {
    pub fn severity(&self) -> Option<Severity> {
        Severity::parse(&self.severity)
    }
}

/// DTO for appending an audit event.
#[derive(Debug, Clone)]
pub struct CreateSecurityAuditEvent {
    pub user_id: Option<DbId>,
    pub event_type: String,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_path: Option<String>,
    pub request_method: Option<String>,
    pub severity: Severity,
    pub metadata: serde_json::Value,
}
