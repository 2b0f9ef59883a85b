//! Best-effort security audit logging.
//!
//! [`AuditLogger::log_event`] never returns an error. A failed append is
//! reported through `tracing::error!` and otherwise dropped, so an audit
//! outage can never abort the operation being audited.

use std::sync::Arc;

use haven_core::security_events::{default_severity, event_types, redact_sensitive_fields, Severity};
use haven_core::types::DbId;
use haven_db::models::security_audit::CreateSecurityAuditEvent;
use haven_db::store::AuditStore;
use serde_json::{json, Value};
use tracing::Level;

use super::context::RequestContext;

/// One security event, before request metadata is attached.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub user_id: Option<DbId>,
    pub event_type: &'static str,
    pub description: String,
    pub severity: Severity,
    pub metadata: Value,
}

impl AuditEvent {
    /// An event with the taxonomy's default severity and empty metadata.
    pub fn new(event_type: &'static str, description: impl Into<String>) -> Self {
        Self {
            user_id: None,
            event_type,
            description: description.into(),
            severity: default_severity(event_type),
            metadata: json!({}),
        }
    }

    pub fn user(mut self, user_id: DbId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Appends [`AuditEvent`]s to an [`AuditStore`].
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append an event. Metadata is redacted before it leaves the process.
    pub async fn log_event(&self, event: AuditEvent, ctx: &RequestContext) {
        let row = CreateSecurityAuditEvent {
            user_id: event.user_id,
            event_type: event.event_type.to_string(),
            description: event.description,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            request_path: ctx.request_path.clone(),
            request_method: ctx.request_method.clone(),
            severity: event.severity,
            metadata: redact_sensitive_fields(&event.metadata),
        };

        match trace_level(event.severity) {
            Level::ERROR => tracing::error!(
                event_type = row.event_type,
                user_id = ?row.user_id,
                "Critical security event"
            ),
            Level::WARN => tracing::warn!(
                event_type = row.event_type,
                user_id = ?row.user_id,
                "Security warning"
            ),
            _ => tracing::info!(
                event_type = row.event_type,
                user_id = ?row.user_id,
                "Security event"
            ),
        }

        if let Err(e) = self.store.append(row).await {
            tracing::error!(
                error = %e,
                event_type = event.event_type,
                "Failed to persist security audit event"
            );
        }
    }

    /// Authentication outcomes (login, token issuance and refresh).
    pub async fn log_auth_event(
        &self,
        event_type: &'static str,
        user_id: Option<DbId>,
        description: impl Into<String>,
        metadata: Value,
        ctx: &RequestContext,
    ) {
        let mut event = AuditEvent::new(event_type, description).metadata(metadata);
        event.user_id = user_id;
        self.log_event(event, ctx).await;
    }

    pub async fn log_suspicious_activity(
        &self,
        user_id: Option<DbId>,
        description: impl Into<String>,
        metadata: Value,
        ctx: &RequestContext,
    ) {
        let mut event = AuditEvent::new(event_types::SUSPICIOUS_ACTIVITY, description)
            .severity(Severity::Warning)
            .metadata(metadata);
        event.user_id = user_id;
        self.log_event(event, ctx).await;
    }

    /// A user reached an operation their role does not permit.
    pub async fn log_privilege_escalation(
        &self,
        user_id: DbId,
        role: &str,
        required_role: &str,
        ctx: &RequestContext,
    ) {
        let event = AuditEvent::new(
            event_types::PRIVILEGE_ESCALATION,
            format!("Role '{role}' attempted an operation requiring '{required_role}'"),
        )
        .user(user_id)
        .severity(Severity::Critical)
        .metadata(json!({ "role": role, "required_role": required_role }));
        self.log_event(event, ctx).await;
    }

    /// Access to another user's data.
    pub async fn log_data_access(
        &self,
        user_id: DbId,
        resource: &str,
        resource_id: Option<DbId>,
        ctx: &RequestContext,
    ) {
        let event = AuditEvent::new(event_types::DATA_ACCESS, format!("Accessed {resource}"))
            .user(user_id)
            .severity(Severity::Info)
            .metadata(json!({ "resource": resource, "resource_id": resource_id }));
        self.log_event(event, ctx).await;
    }
}

/// Process log level for an audit severity.
fn trace_level(severity: Severity) -> Level {
    match severity {
        Severity::Critical => Level::ERROR,
        Severity::Warning => Level::WARN,
        Severity::Info => Level::INFO,
    }
}
