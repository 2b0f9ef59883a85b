//! Storage traits.
//!
//! The session manager, access verifier, brute-force detector and audit
//! logger depend on these traits rather than on a concrete pool, so the same
//! code runs against PostgreSQL ([`crate::pg`]) or memory ([`crate::memory`]).
//! Every method is a potential suspension point; callers must not hold an
//! in-process lock across them.

use async_trait::async_trait;
use haven_core::types::{DbId, SessionId, Timestamp};

use crate::error::StoreResult;
use crate::models::login_attempt::{CreateLoginAttempt, LoginAttempt};
use crate::models::refresh_token::{CreateRefreshToken, RefreshTokenRow, RotateOutcome};
use crate::models::security_audit::{CreateSecurityAuditEvent, SecurityAuditEvent};
use crate::models::user::{LoginCredentials, UserStatus};

/// Persisted refresh-token records.
///
/// All lookups are keyed by the SHA-256 fingerprint of the token value.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Append a new row.
    async fn insert(&self, row: CreateRefreshToken) -> StoreResult<RefreshTokenRow>;

    /// Find an unexpired row by fingerprint, revoked or not.
    ///
    /// Revocation is deliberately not filtered so callers can tell a replayed
    /// token apart from an unknown one.
    async fn find_active_by_token(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRow>>;

    /// Revoke a single row. Returns the updated row, or `None` when the row
    /// was missing or already revoked.
    async fn revoke(&self, token_hash: &str, reason: &str) -> StoreResult<Option<RefreshTokenRow>>;

    /// Revoke every non-revoked row of a user, returning the affected session ids.
    async fn revoke_all_for_user(&self, user_id: DbId, reason: &str)
        -> StoreResult<Vec<SessionId>>;

    /// Revoke all but the `keep` most recently created non-revoked rows of a
    /// user. Returns the session ids that were evicted.
    async fn enforce_device_cap(
        &self,
        user_id: DbId,
        keep: usize,
        reason: &str,
    ) -> StoreResult<Vec<SessionId>>;

    /// Atomically revoke the presented row and insert its replacement.
    ///
    /// Either both writes commit or neither does. A concurrent caller that
    /// loses the race observes [`RotateOutcome::AlreadyRevoked`].
    async fn rotate(
        &self,
        presented_hash: &str,
        reason: &str,
        replacement: CreateRefreshToken,
    ) -> StoreResult<RotateOutcome>;

    /// Unexpired rows of a user, newest first.
    async fn list_for_user(&self, user_id: DbId) -> StoreResult<Vec<RefreshTokenRow>>;

    /// Users holding more than `keep` non-revoked rows.
    async fn users_over_cap(&self, keep: usize) -> StoreResult<Vec<DbId>>;

    /// Delete rows whose `expires_at` has passed. Returns the count deleted.
    async fn purge_expired(&self) -> StoreResult<u64>;
}

/// Append-only login attempt history.
#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    async fn record(&self, attempt: CreateLoginAttempt) -> StoreResult<LoginAttempt>;

    /// Count failed attempts since `since` matching the email OR the address.
    async fn count_failures_since(
        &self,
        email: &str,
        ip_address: Option<&str>,
        since: Timestamp,
    ) -> StoreResult<u32>;
}

/// Append-only security audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, event: CreateSecurityAuditEvent) -> StoreResult<SecurityAuditEvent>;
}

/// Read access to the identity tables owned by the wider application.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fresh activation status and role. `None` when the user does not exist.
    async fn get_user_active_status_and_role(&self, user_id: DbId)
        -> StoreResult<Option<UserStatus>>;

    async fn find_login_credentials(&self, email: &str) -> StoreResult<Option<LoginCredentials>>;
}
