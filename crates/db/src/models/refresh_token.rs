//! Refresh token model and DTOs.
//!
//! A row is created at login or rotation and afterwards only mutated to flip
//! `is_revoked` (never back). Rows are deleted by the janitor once past
//! `expires_at`.

use haven_core::types::{DbId, SessionId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A refresh token row from the `refresh_tokens` table.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRow {
    pub id: DbId,
    pub user_id: DbId,
    /// SHA-256 hex digest of the signed token value.
    pub token_hash: String,
    pub jti: String,
    pub session_id: SessionId,
    pub expires_at: Timestamp,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<serde_json::Value>,
    pub is_revoked: bool,
    pub revoked_at: Option<Timestamp>,
    pub revocation_reason: Option<String>,
    pub created_at: Timestamp,
}

impl RefreshTokenRow {
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

/// DTO for inserting a new refresh token row.
#[derive(Debug, Clone)]
pub struct CreateRefreshToken {
    pub user_id: DbId,
    pub token_hash: String,
    pub jti: String,
    pub session_id: SessionId,
    pub expires_at: Timestamp,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<serde_json::Value>,
}

/// Result of the atomic revoke-old + insert-new transaction.
#[derive(Debug, Clone)]
pub enum RotateOutcome {
    /// The presented row was revoked and the new row stored.
    Rotated(RefreshTokenRow),
    /// The presented row exists but was already revoked. Nothing was written.
    AlreadyRevoked,
    /// No unexpired row matches the presented token. Nothing was written.
    NotFound,
}

/// One entry of the "manage your devices" listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub created_at: Timestamp,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<serde_json::Value>,
    pub expires_at: Timestamp,
    pub is_active: bool,
}

impl From<RefreshTokenRow> for SessionSummary {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            session_id: row.session_id,
            created_at: row.created_at,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            device_info: row.device_info,
            expires_at: row.expires_at,
            is_active: !row.is_revoked,
        }
    }
}
