//! In-memory implementations of the storage traits.
//!
//! Each store keeps its rows behind a single mutex, so every trait method is
//! atomic with respect to the others. That matches the transactional
//! guarantees of the PostgreSQL implementations closely enough for tests and
//! single-process local runs. The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use haven_core::types::{DbId, SessionId, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::models::login_attempt::{CreateLoginAttempt, LoginAttempt};
use crate::models::refresh_token::{CreateRefreshToken, RefreshTokenRow, RotateOutcome};
use crate::models::security_audit::{CreateSecurityAuditEvent, SecurityAuditEvent};
use crate::models::user::{LoginCredentials, UserStatus};
use crate::store::{AuditStore, CredentialStore, IdentityStore, LoginAttemptStore};

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
}

fn ensure_available(flag: &AtomicBool) -> StoreResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Unavailable("store marked unavailable".into()));
    }
    Ok(())
}

fn next_id(counter: &AtomicI64) -> DbId {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

fn revoke_row(row: &mut RefreshTokenRow, reason: &str, now: Timestamp) {
    row.is_revoked = true;
    row.revoked_at = Some(now);
    row.revocation_reason = Some(reason.to_string());
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

/// In-memory refresh token table.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    rows: Mutex<Vec<RefreshTokenRow>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of every stored row in insertion order.
    pub fn rows(&self) -> Vec<RefreshTokenRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    /// Overwrite the expiry of the row with the given fingerprint.
    pub fn set_expires_at(&self, token_hash: &str, expires_at: Timestamp) {
        if let Ok(mut rows) = self.rows.lock() {
            for row in rows.iter_mut().filter(|r| r.token_hash == token_hash) {
                row.expires_at = expires_at;
            }
        }
    }

    fn build_row(&self, input: CreateRefreshToken) -> RefreshTokenRow {
        RefreshTokenRow {
            id: next_id(&self.next_id),
            user_id: input.user_id,
            token_hash: input.token_hash,
            jti: input.jti,
            session_id: input.session_id,
            expires_at: input.expires_at,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            device_info: input.device_info,
            is_revoked: false,
            revoked_at: None,
            revocation_reason: None,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, row: CreateRefreshToken) -> StoreResult<RefreshTokenRow> {
        ensure_available(&self.unavailable)?;
        let mut rows = lock(&self.rows)?;
        if rows.iter().any(|r| r.token_hash == row.token_hash || r.jti == row.jti) {
            return Err(StoreError::Conflict(
                "duplicate refresh token fingerprint or jti".into(),
            ));
        }
        let row = self.build_row(row);
        rows.push(row.clone());
        Ok(row)
    }

    async fn find_active_by_token(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRow>> {
        ensure_available(&self.unavailable)?;
        let now = Utc::now();
        let rows = lock(&self.rows)?;
        Ok(rows
            .iter()
            .find(|r| r.token_hash == token_hash && !r.is_expired_at(now))
            .cloned())
    }

    async fn revoke(&self, token_hash: &str, reason: &str) -> StoreResult<Option<RefreshTokenRow>> {
        ensure_available(&self.unavailable)?;
        let now = Utc::now();
        let mut rows = lock(&self.rows)?;
        Ok(rows
            .iter_mut()
            .find(|r| r.token_hash == token_hash && !r.is_revoked)
            .map(|row| {
                revoke_row(row, reason, now);
                row.clone()
            }))
    }

    async fn revoke_all_for_user(
        &self,
        user_id: DbId,
        reason: &str,
    ) -> StoreResult<Vec<SessionId>> {
        ensure_available(&self.unavailable)?;
        let now = Utc::now();
        let mut rows = lock(&self.rows)?;
        let mut sessions = Vec::new();
        for row in rows
            .iter_mut()
            .filter(|r| r.user_id == user_id && !r.is_revoked)
        {
            revoke_row(row, reason, now);
            sessions.push(row.session_id);
        }
        Ok(sessions)
    }

    async fn enforce_device_cap(
        &self,
        user_id: DbId,
        keep: usize,
        reason: &str,
    ) -> StoreResult<Vec<SessionId>> {
        ensure_available(&self.unavailable)?;
        let now = Utc::now();
        let mut rows = lock(&self.rows)?;

        let mut live: Vec<(Timestamp, DbId)> = rows
            .iter()
            .filter(|r| r.user_id == user_id && !r.is_revoked)
            .map(|r| (r.created_at, r.id))
            .collect();
        // Newest first; id breaks created_at ties.
        live.sort_unstable_by(|a, b| b.cmp(a));
        let evict: Vec<DbId> = live.into_iter().skip(keep).map(|(_, id)| id).collect();

        let mut sessions = Vec::with_capacity(evict.len());
        for row in rows.iter_mut().filter(|r| evict.contains(&r.id)) {
            revoke_row(row, reason, now);
            sessions.push(row.session_id);
        }
        Ok(sessions)
    }

    async fn rotate(
        &self,
        presented_hash: &str,
        reason: &str,
        replacement: CreateRefreshToken,
    ) -> StoreResult<RotateOutcome> {
        ensure_available(&self.unavailable)?;
        let now = Utc::now();
        let mut rows = lock(&self.rows)?;

        let Some(idx) = rows
            .iter()
            .position(|r| r.token_hash == presented_hash && !r.is_expired_at(now))
        else {
            return Ok(RotateOutcome::NotFound);
        };
        if rows[idx].is_revoked {
            return Ok(RotateOutcome::AlreadyRevoked);
        }
        if rows
            .iter()
            .any(|r| r.token_hash == replacement.token_hash || r.jti == replacement.jti)
        {
            return Err(StoreError::Conflict(
                "duplicate refresh token fingerprint or jti".into(),
            ));
        }

        revoke_row(&mut rows[idx], reason, now);
        let row = self.build_row(replacement);
        rows.push(row.clone());
        Ok(RotateOutcome::Rotated(row))
    }

    async fn list_for_user(&self, user_id: DbId) -> StoreResult<Vec<RefreshTokenRow>> {
        ensure_available(&self.unavailable)?;
        let now = Utc::now();
        let rows = lock(&self.rows)?;
        let mut out: Vec<RefreshTokenRow> = rows
            .iter()
            .filter(|r| r.user_id == user_id && !r.is_expired_at(now))
            .cloned()
            .collect();
        out.sort_unstable_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(out)
    }

    async fn users_over_cap(&self, keep: usize) -> StoreResult<Vec<DbId>> {
        ensure_available(&self.unavailable)?;
        let rows = lock(&self.rows)?;
        let mut counts: HashMap<DbId, usize> = HashMap::new();
        for row in rows.iter().filter(|r| !r.is_revoked) {
            *counts.entry(row.user_id).or_default() += 1;
        }
        let mut users: Vec<DbId> = counts
            .into_iter()
            .filter(|(_, count)| *count > keep)
            .map(|(user_id, _)| user_id)
            .collect();
        users.sort_unstable();
        Ok(users)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        ensure_available(&self.unavailable)?;
        let now = Utc::now();
        let mut rows = lock(&self.rows)?;
        let before = rows.len();
        rows.retain(|r| r.expires_at >= now);
        Ok((before - rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Login attempts
// ---------------------------------------------------------------------------

/// In-memory login attempt history.
#[derive(Debug, Default)]
pub struct MemoryLoginAttemptStore {
    attempts: Mutex<Vec<LoginAttempt>>,
    next_id: AtomicI64,
}

impl MemoryLoginAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attempt with an explicit timestamp.
    pub fn record_at(&self, attempt: CreateLoginAttempt, created_at: Timestamp) -> LoginAttempt {
        let row = LoginAttempt {
            id: next_id(&self.next_id),
            email: attempt.email,
            ip_address: attempt.ip_address,
            success: attempt.success,
            failure_reason: attempt.failure_reason,
            user_agent: attempt.user_agent,
            created_at,
        };
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(row.clone());
        }
        row
    }

    pub fn attempts(&self) -> Vec<LoginAttempt> {
        self.attempts
            .lock()
            .map(|attempts| attempts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LoginAttemptStore for MemoryLoginAttemptStore {
    async fn record(&self, attempt: CreateLoginAttempt) -> StoreResult<LoginAttempt> {
        Ok(self.record_at(attempt, Utc::now()))
    }

    async fn count_failures_since(
        &self,
        email: &str,
        ip_address: Option<&str>,
        since: Timestamp,
    ) -> StoreResult<u32> {
        let attempts = lock(&self.attempts)?;
        let count = attempts
            .iter()
            .filter(|a| !a.success && a.created_at >= since)
            .filter(|a| {
                a.email == email
                    || (ip_address.is_some() && a.ip_address.as_deref() == ip_address)
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// In-memory security audit trail.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    events: Mutex<Vec<SecurityAuditEvent>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<SecurityAuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events of the given type, oldest first.
    pub fn events_of_type(&self, event_type: &str) -> Vec<SecurityAuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, event: CreateSecurityAuditEvent) -> StoreResult<SecurityAuditEvent> {
        ensure_available(&self.unavailable)?;
        let row = SecurityAuditEvent {
            id: next_id(&self.next_id),
            user_id: event.user_id,
            event_type: event.event_type,
            description: event.description,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            request_path: event.request_path,
            request_method: event.request_method,
            severity: event.severity.as_str().to_string(),
            metadata: event.metadata,
            created_at: Utc::now(),
        };
        lock(&self.events)?.push(row.clone());
        Ok(row)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemoryUser {
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
}

/// In-memory stand-in for the application's users table.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    users: Mutex<HashMap<DbId, MemoryUser>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub fn upsert_user(
        &self,
        user_id: DbId,
        email: &str,
        password_hash: &str,
        role: &str,
        is_active: bool,
    ) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(
                user_id,
                MemoryUser {
                    email: email.to_string(),
                    password_hash: password_hash.to_string(),
                    role: role.to_string(),
                    is_active,
                },
            );
        }
    }

    pub fn set_active(&self, user_id: DbId, is_active: bool) {
        if let Ok(mut users) = self.users.lock() {
            if let Some(user) = users.get_mut(&user_id) {
                user.is_active = is_active;
            }
        }
    }

    pub fn set_role(&self, user_id: DbId, role: &str) {
        if let Ok(mut users) = self.users.lock() {
            if let Some(user) = users.get_mut(&user_id) {
                user.role = role.to_string();
            }
        }
    }

    pub fn remove_user(&self, user_id: DbId) {
        if let Ok(mut users) = self.users.lock() {
            users.remove(&user_id);
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get_user_active_status_and_role(
        &self,
        user_id: DbId,
    ) -> StoreResult<Option<UserStatus>> {
        let users = lock(&self.users)?;
        Ok(users.get(&user_id).map(|u| UserStatus {
            is_active: u.is_active,
            role: u.role.clone(),
        }))
    }

    async fn find_login_credentials(&self, email: &str) -> StoreResult<Option<LoginCredentials>> {
        let users = lock(&self.users)?;
        Ok(users
            .iter()
            .find(|(_, u)| u.email.eq_ignore_ascii_case(email))
            .map(|(id, u)| LoginCredentials {
                user_id: *id,
                email: u.email.clone(),
                password_hash: u.password_hash.clone(),
                is_active: u.is_active,
                role: u.role.clone(),
            }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use uuid::Uuid;

    fn new_row(user_id: DbId, hash: &str) -> CreateRefreshToken {
        CreateRefreshToken {
            user_id,
            token_hash: hash.to_string(),
            jti: format!("rt_{hash}"),
            session_id: Uuid::new_v4(),
            expires_at: Utc::now() + Duration::days(7),
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("test-agent".into()),
            device_info: None,
        }
    }

    #[tokio::test]
    async fn find_returns_revoked_rows() {
        let store = MemoryCredentialStore::new();
        store.insert(new_row(1, "h1")).await.unwrap();
        store.revoke("h1", "logout").await.unwrap();

        let found = store.find_active_by_token("h1").await.unwrap().unwrap();
        assert!(found.is_revoked);
        assert_eq!(found.revocation_reason.as_deref(), Some("logout"));
    }

    #[tokio::test]
    async fn find_skips_expired_rows() {
        let store = MemoryCredentialStore::new();
        store.insert(new_row(1, "h1")).await.unwrap();
        store.set_expires_at("h1", Utc::now() - Duration::seconds(1));

        assert!(store.find_active_by_token("h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemoryCredentialStore::new();
        store.insert(new_row(1, "h1")).await.unwrap();

        assert!(store.revoke("h1", "logout").await.unwrap().is_some());
        assert!(store.revoke("h1", "logout").await.unwrap().is_none());
        assert!(store.revoke("missing", "logout").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoke_never_rewrites_the_first_reason() {
        let store = MemoryCredentialStore::new();
        store.insert(new_row(1, "h1")).await.unwrap();
        store.revoke("h1", "rotated").await.unwrap();
        store.revoke_all_for_user(1, "logout_all").await.unwrap();

        let row = &store.rows()[0];
        assert!(row.is_revoked);
        assert_eq!(row.revocation_reason.as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn device_cap_keeps_newest_rows() {
        let store = MemoryCredentialStore::new();
        for i in 0..7 {
            store.insert(new_row(1, &format!("h{i}"))).await.unwrap();
        }
        store.insert(new_row(2, "other")).await.unwrap();

        let evicted = store.enforce_device_cap(1, 5, "cap").await.unwrap();
        assert_eq!(evicted.len(), 2);

        let rows = store.rows();
        let live: Vec<&str> = rows
            .iter()
            .filter(|r| r.user_id == 1 && !r.is_revoked)
            .map(|r| r.token_hash.as_str())
            .collect();
        assert_eq!(live, vec!["h2", "h3", "h4", "h5", "h6"]);
        assert!(rows.iter().any(|r| r.token_hash == "other" && !r.is_revoked));
    }

    #[tokio::test]
    async fn device_cap_below_limit_is_noop() {
        let store = MemoryCredentialStore::new();
        store.insert(new_row(1, "h1")).await.unwrap();
        assert!(store.enforce_device_cap(1, 5, "cap").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rotate_outcomes() {
        let store = MemoryCredentialStore::new();
        store.insert(new_row(1, "old")).await.unwrap();

        let outcome = store.rotate("old", "rotated", new_row(1, "new")).await.unwrap();
        assert_matches!(outcome, RotateOutcome::Rotated(row) if row.token_hash == "new");

        let again = store.rotate("old", "rotated", new_row(1, "newer")).await.unwrap();
        assert_matches!(again, RotateOutcome::AlreadyRevoked);

        let missing = store.rotate("nope", "rotated", new_row(1, "x")).await.unwrap();
        assert_matches!(missing, RotateOutcome::NotFound);

        // Losing branches wrote nothing.
        assert_eq!(store.rows().len(), 2);
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let store = MemoryCredentialStore::new();
        store.insert(new_row(1, "live")).await.unwrap();
        store.insert(new_row(1, "dead")).await.unwrap();
        store.set_expires_at("dead", Utc::now() - Duration::hours(1));

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.rows().len(), 1);
        assert_eq!(store.rows()[0].token_hash, "live");
    }

    #[tokio::test]
    async fn users_over_cap_counts_non_revoked_rows() {
        let store = MemoryCredentialStore::new();
        for i in 0..3 {
            store.insert(new_row(7, &format!("a{i}"))).await.unwrap();
        }
        store.insert(new_row(8, "b0")).await.unwrap();

        assert_eq!(store.users_over_cap(2).await.unwrap(), vec![7]);
        store.revoke("a0", "logout").await.unwrap();
        assert!(store.users_over_cap(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_fingerprint_is_a_conflict() {
        let store = MemoryCredentialStore::new();
        store.insert(new_row(1, "h1")).await.unwrap();

        assert_matches!(
            store.insert(new_row(2, "h1")).await,
            Err(StoreError::Conflict(_))
        );

        store.insert(new_row(1, "h2")).await.unwrap();
        assert_matches!(
            store.rotate("h2", "rotated", new_row(1, "h1")).await,
            Err(StoreError::Conflict(_))
        );
        // The failed rotation left the presented row untouched.
        let row = store.find_active_by_token("h2").await.unwrap().unwrap();
        assert!(!row.is_revoked);
    }

    #[tokio::test]
    async fn unavailable_store_reports_errors() {
        let store = MemoryCredentialStore::new();
        store.set_unavailable(true);
        assert_matches!(
            store.find_active_by_token("h").await,
            Err(StoreError::Unavailable(_))
        );
    }

    #[tokio::test]
    async fn login_failures_match_email_or_address() {
        let store = MemoryLoginAttemptStore::new();
        let failure = |email: &str, ip: &str| CreateLoginAttempt {
            email: email.to_string(),
            ip_address: Some(ip.to_string()),
            success: false,
            failure_reason: Some("invalid_password".into()),
            user_agent: None,
        };
        store.record(failure("a@example.com", "1.1.1.1")).await.unwrap();
        store.record(failure("b@example.com", "2.2.2.2")).await.unwrap();
        store.record(failure("c@example.com", "3.3.3.3")).await.unwrap();

        let since = Utc::now() - Duration::minutes(15);
        let count = store
            .count_failures_since("a@example.com", Some("2.2.2.2"), since)
            .await
            .unwrap();
        assert_eq!(count, 2);

        let email_only = store
            .count_failures_since("a@example.com", None, since)
            .await
            .unwrap();
        assert_eq!(email_only, 1);
    }
}
