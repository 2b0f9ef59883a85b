//! Rotation races where a competing rotation commits between validation and
//! the store's atomic swap.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use haven_api::auth::audit::AuditLogger;
use haven_api::auth::context::RequestContext;
use haven_api::auth::jwt::TokenCodec;
use haven_api::auth::session::{SessionManager, SessionPolicy};
use haven_core::error::AuthError;
use haven_core::tokens::revocation_reasons;
use haven_core::types::{DbId, SessionId};
use haven_db::memory::{MemoryAuditStore, MemoryCredentialStore, MemoryIdentityStore};
use haven_db::models::refresh_token::{CreateRefreshToken, RefreshTokenRow, RotateOutcome};
use haven_db::store::CredentialStore;
use haven_db::StoreResult;

/// Credential store that, when armed, lets a rival rotation of the same
/// token commit just before the caller's own rotation reaches the store.
#[derive(Default)]
struct RivalRotationStore {
    inner: MemoryCredentialStore,
    armed: AtomicBool,
}

impl RivalRotationStore {
    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialStore for RivalRotationStore {
    async fn insert(&self, row: CreateRefreshToken) -> StoreResult<RefreshTokenRow> {
        self.inner.insert(row).await
    }

    async fn find_active_by_token(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenRow>> {
        self.inner.find_active_by_token(token_hash).await
    }

    async fn revoke(&self, token_hash: &str, reason: &str) -> StoreResult<Option<RefreshTokenRow>> {
        self.inner.revoke(token_hash, reason).await
    }

    async fn revoke_all_for_user(
        &self,
        user_id: DbId,
        reason: &str,
    ) -> StoreResult<Vec<SessionId>> {
        self.inner.revoke_all_for_user(user_id, reason).await
    }

    async fn enforce_device_cap(
        &self,
        user_id: DbId,
        keep: usize,
        reason: &str,
    ) -> StoreResult<Vec<SessionId>> {
        self.inner.enforce_device_cap(user_id, keep, reason).await
    }

    async fn rotate(
        &self,
        presented_hash: &str,
        reason: &str,
        replacement: CreateRefreshToken,
    ) -> StoreResult<RotateOutcome> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let rival = CreateRefreshToken {
                token_hash: format!("rival-{}", replacement.token_hash),
                jti: format!("{}-rival", replacement.jti),
                ..replacement.clone()
            };
            let outcome = self.inner.rotate(presented_hash, reason, rival).await?;
            assert_matches!(outcome, RotateOutcome::Rotated(_));
        }
        self.inner.rotate(presented_hash, reason, replacement).await
    }

    async fn list_for_user(&self, user_id: DbId) -> StoreResult<Vec<RefreshTokenRow>> {
        self.inner.list_for_user(user_id).await
    }

    async fn users_over_cap(&self, keep: usize) -> StoreResult<Vec<DbId>> {
        self.inner.users_over_cap(keep).await
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        self.inner.purge_expired().await
    }
}

struct RaceHarness {
    sessions: SessionManager,
    credentials: Arc<RivalRotationStore>,
    audit: Arc<MemoryAuditStore>,
}

fn race_harness(policy: SessionPolicy) -> RaceHarness {
    let credentials = Arc::new(RivalRotationStore::default());
    let identity = Arc::new(MemoryIdentityStore::new());
    identity.upsert_user(1, "ana@example.com", "unused-hash", "member", true);
    let audit = Arc::new(MemoryAuditStore::new());

    let sessions = SessionManager::new(
        Arc::new(TokenCodec::new(&common::jwt_config())),
        credentials.clone(),
        identity,
        AuditLogger::new(audit.clone()),
        policy,
    );
    RaceHarness {
        sessions,
        credentials,
        audit,
    }
}

#[tokio::test]
async fn losing_rotation_is_reported_as_reuse() {
    let h = race_harness(SessionPolicy::default());
    let ctx = RequestContext::default();
    let pair = h.sessions.issue(1, "member", None, &ctx).await.unwrap();

    h.credentials.arm();
    assert_matches!(
        h.sessions.rotate(&pair.refresh_token, &ctx).await,
        Err(AuthError::TokenRevoked)
    );

    // Only the rival's replacement was stored.
    let rows = h.credentials.inner.rows();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].is_revoked);
    assert!(rows[1].token_hash.starts_with("rival-"));
    assert!(!rows[1].is_revoked);

    let reuse = h.audit.events_of_type("token_reuse_detected");
    assert_eq!(reuse.len(), 1);
    assert_eq!(reuse[0].severity, "critical");
    assert_eq!(reuse[0].metadata["revocation_reason"], revocation_reasons::ROTATED);
    assert!(reuse[0].metadata["revoked_at"].is_string());
    assert!(h.audit.events_of_type("token_refreshed").is_empty());
}

#[tokio::test]
async fn losing_rotation_triggers_containment_when_enabled() {
    let h = race_harness(SessionPolicy {
        revoke_all_on_reuse: true,
        ..SessionPolicy::default()
    });
    let ctx = RequestContext::default();
    let pair = h.sessions.issue(1, "member", None, &ctx).await.unwrap();

    h.credentials.arm();
    assert_matches!(
        h.sessions.rotate(&pair.refresh_token, &ctx).await,
        Err(AuthError::TokenRevoked)
    );

    assert!(h.credentials.inner.rows().iter().all(|r| r.is_revoked));
    let contained = h.audit.events_of_type("all_tokens_revoked");
    assert_eq!(contained.len(), 1);
    assert_eq!(contained[0].metadata["session_count"], 1);
}
