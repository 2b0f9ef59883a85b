//! Login attempt model. Append-only; rows are never updated.

use haven_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `login_attempts` table.
#[derive(Debug, Clone, FromRow)]
pub struct LoginAttempt {
    pub id: DbId,
    pub email: String,
    pub ip_address: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for recording a login attempt.
#[derive(Debug, Clone)]
pub struct CreateLoginAttempt {
    pub email: String,
    pub ip_address: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub user_agent: Option<String>,
}
