//! PostgreSQL-backed implementations of the storage traits.

use async_trait::async_trait;
use haven_core::types::{DbId, SessionId, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::models::login_attempt::{CreateLoginAttempt, LoginAttempt};
use crate::models::refresh_token::{CreateRefreshToken, RefreshTokenRow, RotateOutcome};
use crate::models::security_audit::{CreateSecurityAuditEvent, SecurityAuditEvent};
use crate::models::user::{LoginCredentials, UserStatus};
use crate::repositories::{LoginAttemptRepo, RefreshTokenRepo, SecurityAuditRepo, UserRepo};
use crate::store::{AuditStore, CredentialStore, IdentityStore, LoginAttemptStore};
use crate::DbPool;

/// Credential store over the `refresh_tokens` table.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn insert(&self, row: CreateRefreshToken) -> StoreResult<RefreshTokenRow> {
        RefreshTokenRepo::create(&self.pool, &row)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_active_by_token(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRow>> {
        Ok(RefreshTokenRepo::find_unexpired_by_hash(&self.pool, token_hash).await?)
    }

    async fn revoke(&self, token_hash: &str, reason: &str) -> StoreResult<Option<RefreshTokenRow>> {
        Ok(RefreshTokenRepo::revoke(&self.pool, token_hash, reason).await?)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: DbId,
        reason: &str,
    ) -> StoreResult<Vec<SessionId>> {
        Ok(RefreshTokenRepo::revoke_all_for_user(&self.pool, user_id, reason).await?)
    }

    async fn enforce_device_cap(
        &self,
        user_id: DbId,
        keep: usize,
        reason: &str,
    ) -> StoreResult<Vec<SessionId>> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        Ok(RefreshTokenRepo::revoke_beyond_newest(&self.pool, user_id, keep, reason).await?)
    }

    async fn rotate(
        &self,
        presented_hash: &str,
        reason: &str,
        replacement: CreateRefreshToken,
    ) -> StoreResult<RotateOutcome> {
        RefreshTokenRepo::rotate(&self.pool, presented_hash, reason, &replacement)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn list_for_user(&self, user_id: DbId) -> StoreResult<Vec<RefreshTokenRow>> {
        Ok(RefreshTokenRepo::list_for_user(&self.pool, user_id).await?)
    }

    async fn users_over_cap(&self, keep: usize) -> StoreResult<Vec<DbId>> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        Ok(RefreshTokenRepo::users_over_cap(&self.pool, keep).await?)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        Ok(RefreshTokenRepo::delete_expired(&self.pool).await?)
    }
}

/// Login attempt history over the `login_attempts` table.
#[derive(Clone)]
pub struct PgLoginAttemptStore {
    pool: DbPool,
}

impl PgLoginAttemptStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptStore for PgLoginAttemptStore {
    async fn record(&self, attempt: CreateLoginAttempt) -> StoreResult<LoginAttempt> {
        Ok(LoginAttemptRepo::create(&self.pool, &attempt).await?)
    }

    async fn count_failures_since(
        &self,
        email: &str,
        ip_address: Option<&str>,
        since: Timestamp,
    ) -> StoreResult<u32> {
        let count =
            LoginAttemptRepo::count_failures_since(&self.pool, email, ip_address, since).await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

/// Audit trail over the `security_audit_events` table.
#[derive(Clone)]
pub struct PgAuditStore {
    pool: DbPool,
}

impl PgAuditStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, event: CreateSecurityAuditEvent) -> StoreResult<SecurityAuditEvent> {
        Ok(SecurityAuditRepo::create(&self.pool, &event).await?)
    }
}

/// Identity lookups over the `users` and `roles` tables.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: DbPool,
}

impl PgIdentityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn get_user_active_status_and_role(
        &self,
        user_id: DbId,
    ) -> StoreResult<Option<UserStatus>> {
        Ok(UserRepo::find_status(&self.pool, user_id).await?)
    }

    async fn find_login_credentials(&self, email: &str) -> StoreResult<Option<LoginCredentials>> {
        Ok(UserRepo::find_credentials_by_email(&self.pool, email).await?)
    }
}
