//! Repository for the append-only `security_audit_events` table.

use sqlx::PgPool;

use crate::models::security_audit::{CreateSecurityAuditEvent, SecurityAuditEvent};

/// Column list for SELECT/RETURNING clauses.
const COLUMNS: &str = "\
    id, user_id, event_type, description, ip_address, user_agent, \
    request_path, request_method, severity, metadata, created_at";

/// Provides insert and query operations for security audit events.
pub struct SecurityAuditRepo;

impl SecurityAuditRepo {
    /// Append a single event.
    pub async fn create(
        pool: &PgPool,
        input: &CreateSecurityAuditEvent,
    ) -> Result<SecurityAuditEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO security_audit_events
                (user_id, event_type, description, ip_address, user_agent,
                 request_path, request_method, severity, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SecurityAuditEvent>(&query)
            .bind(input.user_id)
            .bind(&input.event_type)
            .bind(&input.description)
            .bind(&input.ip_address)
            .bind(&input.user_agent)
            .bind(&input.request_path)
            .bind(&input.request_method)
            .bind(input.severity.as_str())
            .bind(&input.metadata)
            .fetch_one(pool)
            .await
    }
}
