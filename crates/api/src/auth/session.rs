//! Session Manager: issuance, rotation, revocation and cleanup of refresh
//! tokens.
//!
//! The manager holds no mutable state of its own. Every coordination
//! guarantee (single-use refresh tokens, atomic rotation, the device cap)
//! comes from the [`CredentialStore`] it is constructed with.
//!
//! Refresh-token lifecycle per row:
//!
//! ```text
//! Active --rotate--> Rotated --+
//!   |                          +--(past expires_at)--> Purged
//!   +----revoke----> Revoked --+
//! ```
//!
//! A row never returns to `Active`. Presenting a `Rotated` or `Revoked`
//! token is treated as replay and reported as a critical audit event.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use haven_core::error::AuthError;
use haven_core::hashing::token_fingerprint;
use haven_core::security_events::{event_types, Severity};
use haven_core::tokens::{revocation_reasons, JtiPair, DEFAULT_MAX_DEVICES, REFRESH_TOKEN_TTL_DAYS};
use haven_core::types::{DbId, SessionId, Timestamp};
use haven_db::models::refresh_token::{
    CreateRefreshToken, RefreshTokenRow, RotateOutcome, SessionSummary,
};
use haven_db::models::user::UserStatus;
use haven_db::store::{CredentialStore, IdentityStore};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::audit::{AuditEvent, AuditLogger};
use super::context::RequestContext;
use super::jwt::{self, RefreshClaims, TokenCodec, TokenError};

/// Tunables for the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Maximum concurrently active refresh tokens per user.
    pub max_devices: usize,
    /// Revoke every session of a user when replay of a revoked token is seen.
    pub revoke_all_on_reuse: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
            revoke_all_on_reuse: false,
        }
    }
}

/// A freshly issued access/refresh pair.
#[derive(Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: SessionId,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub refresh_expires_at: Timestamp,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("session_id", &self.session_id)
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish_non_exhaustive()
    }
}

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct RotatedSession {
    pub tokens: TokenPair,
    pub user_id: DbId,
    /// Current role of the user, read during validation.
    pub role: String,
}

/// A refresh token that passed every check short of being consumed.
#[derive(Debug, Clone)]
pub struct ValidatedRefresh {
    pub claims: RefreshClaims,
    pub row: RefreshTokenRow,
    pub user: UserStatus,
}

/// Signed tokens plus the row that persists the refresh half.
struct Minted {
    pair: TokenPair,
    row: CreateRefreshToken,
    jti: JtiPair,
}

/// Orchestrates the token codec, credential store, identity store and audit
/// log.
#[derive(Clone)]
pub struct SessionManager {
    codec: Arc<TokenCodec>,
    credentials: Arc<dyn CredentialStore>,
    identity: Arc<dyn IdentityStore>,
    audit: AuditLogger,
    policy: SessionPolicy,
}

impl SessionManager {
    pub fn new(
        codec: Arc<TokenCodec>,
        credentials: Arc<dyn CredentialStore>,
        identity: Arc<dyn IdentityStore>,
        audit: AuditLogger,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            codec,
            credentials,
            identity,
            audit,
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    // -----------------------------------------------------------------------
    // Issuance
    // -----------------------------------------------------------------------

    /// Issue a new token pair.
    ///
    /// Continues `session_id` when given, otherwise starts a new session.
    /// The refresh row is stored before the device cap is applied, so the new
    /// row is always among the survivors.
    pub async fn issue(
        &self,
        user_id: DbId,
        role: &str,
        session_id: Option<SessionId>,
        ctx: &RequestContext,
    ) -> Result<TokenPair, AuthError> {
        let session_id = session_id.unwrap_or_else(Uuid::new_v4);
        let minted = self.mint(
            user_id,
            role,
            session_id,
            ctx.ip_address.clone(),
            ctx.user_agent.clone(),
            ctx.device_info.clone(),
        )?;

        self.credentials.insert(minted.row).await?;
        self.enforce_device_cap(user_id, ctx).await?;

        tracing::info!(user_id, session_id = %session_id, "Issued token pair");
        self.audit
            .log_event(
                AuditEvent::new(event_types::TOKEN_ISSUED, "Token pair issued")
                    .user(user_id)
                    .metadata(json!({
                        "session_id": session_id,
                        "jti_root": minted.jti.root,
                    })),
                ctx,
            )
            .await;

        Ok(minted.pair)
    }

    // -----------------------------------------------------------------------
    // Rotation
    // -----------------------------------------------------------------------

    /// Run every rotation check against a presented refresh token without
    /// consuming it.
    ///
    /// 1. Signature, expiry, issuer/audience and type via the codec.
    /// 2. An unexpired row must exist for the token value.
    /// 3. The row must not be revoked. A revoked row is replay.
    /// 4. The owning user must exist and be active.
    pub async fn validate_refresh(
        &self,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<ValidatedRefresh, AuthError> {
        let claims = match self.codec.verify_refresh(token) {
            Ok(claims) => claims,
            Err(e) => {
                self.refresh_failed(None, e.kind(), ctx).await;
                return Err(AuthError::InvalidToken);
            }
        };

        let Some(row) = self
            .credentials
            .find_active_by_token(&token_fingerprint(token))
            .await?
        else {
            self.refresh_failed(Some(claims.user_id), "not_found", ctx).await;
            return Err(AuthError::InvalidToken);
        };

        if row.user_id != claims.user_id || row.session_id != claims.session_id {
            self.audit
                .log_suspicious_activity(
                    Some(row.user_id),
                    "Refresh token claims do not match the stored row",
                    json!({
                        "session_id": row.session_id,
                        "claimed_user_id": claims.user_id,
                    }),
                    ctx,
                )
                .await;
            return Err(AuthError::InvalidToken);
        }

        if row.is_revoked {
            self.reuse_detected(&row, ctx).await;
            return Err(AuthError::TokenRevoked);
        }

        let user = match self
            .identity
            .get_user_active_status_and_role(row.user_id)
            .await?
        {
            Some(user) if user.is_active => user,
            _ => {
                self.refresh_failed(Some(row.user_id), "user_inactive", ctx).await;
                return Err(AuthError::UserInactive);
            }
        };

        Ok(ValidatedRefresh { claims, row, user })
    }

    /// Exchange a refresh token for a new pair on the same session.
    ///
    /// The presented row is revoked with reason `rotated` and the new row is
    /// inserted in one store transaction. Of two concurrent rotations of the
    /// same token exactly one succeeds; the other gets
    /// [`AuthError::TokenRevoked`].
    pub async fn rotate(
        &self,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<RotatedSession, AuthError> {
        let ValidatedRefresh { row, user, .. } = self.validate_refresh(token, ctx).await?;

        let minted = self.mint(
            row.user_id,
            &user.role,
            row.session_id,
            ctx.ip_address.clone().or_else(|| row.ip_address.clone()),
            ctx.user_agent.clone().or_else(|| row.user_agent.clone()),
            ctx.device_info.clone().or_else(|| row.device_info.clone()),
        )?;

        let outcome = self
            .credentials
            .rotate(&row.token_hash, revocation_reasons::ROTATED, minted.row)
            .await?;

        match outcome {
            RotateOutcome::Rotated(new_row) => {
                tracing::info!(
                    user_id = row.user_id,
                    session_id = %row.session_id,
                    "Rotated refresh token"
                );
                self.audit
                    .log_event(
                        AuditEvent::new(event_types::TOKEN_REFRESHED, "Refresh token rotated")
                            .user(row.user_id)
                            .metadata(json!({
                                "session_id": row.session_id,
                                "previous_jti": row.jti,
                                "new_jti": new_row.jti,
                            })),
                        ctx,
                    )
                    .await;

                Ok(RotatedSession {
                    tokens: minted.pair,
                    user_id: row.user_id,
                    role: user.role,
                })
            }
            RotateOutcome::AlreadyRevoked => {
                // Lost a race against a concurrent rotation of the same token.
                // The row read during validation predates the winner's commit.
                let current = self.reread_revoked(row).await;
                self.reuse_detected(&current, ctx).await;
                Err(AuthError::TokenRevoked)
            }
            RotateOutcome::NotFound => {
                self.refresh_failed(Some(row.user_id), "expired_during_rotation", ctx)
                    .await;
                Err(AuthError::InvalidToken)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Revocation
    // -----------------------------------------------------------------------

    /// Revoke a single refresh token.
    ///
    /// Returns `true` if this call revoked a row, `false` when the token was
    /// unknown or already revoked.
    pub async fn revoke(
        &self,
        token: &str,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<bool, AuthError> {
        let Some(row) = self
            .credentials
            .revoke(&token_fingerprint(token), reason)
            .await?
        else {
            return Ok(false);
        };

        tracing::info!(user_id = row.user_id, session_id = %row.session_id, reason, "Revoked refresh token");
        self.audit
            .log_event(
                AuditEvent::new(event_types::TOKEN_REVOKED, "Refresh token revoked")
                    .user(row.user_id)
                    .metadata(json!({ "session_id": row.session_id, "reason": reason })),
                ctx,
            )
            .await;
        Ok(true)
    }

    /// Revoke every active session of a user. Returns the number revoked.
    pub async fn revoke_all(
        &self,
        user_id: DbId,
        reason: &str,
        ctx: &RequestContext,
    ) -> Result<usize, AuthError> {
        let sessions = self.credentials.revoke_all_for_user(user_id, reason).await?;
        self.all_revoked(user_id, reason, &sessions, ctx).await;
        Ok(sessions.len())
    }

    // -----------------------------------------------------------------------
    // Listing and cleanup
    // -----------------------------------------------------------------------

    /// Unexpired sessions of a user, newest first.
    pub async fn get_user_sessions(&self, user_id: DbId) -> Result<Vec<SessionSummary>, AuthError> {
        let rows = self.credentials.list_for_user(user_id).await?;
        Ok(rows.into_iter().map(SessionSummary::from).collect())
    }

    /// Revoke all but the newest `max_devices` active rows of a user.
    pub async fn enforce_device_cap(
        &self,
        user_id: DbId,
        ctx: &RequestContext,
    ) -> Result<Vec<SessionId>, AuthError> {
        let evicted = self
            .credentials
            .enforce_device_cap(user_id, self.policy.max_devices, revocation_reasons::DEVICE_CAP)
            .await?;

        if !evicted.is_empty() {
            tracing::info!(user_id, evicted = evicted.len(), "Device cap enforced");
            self.audit
                .log_event(
                    AuditEvent::new(event_types::DEVICE_CAP_ENFORCED, "Oldest sessions evicted")
                        .user(user_id)
                        .metadata(json!({
                            "evicted_session_ids": evicted,
                            "evicted_count": evicted.len(),
                            "max_devices": self.policy.max_devices,
                        })),
                    ctx,
                )
                .await;
        }
        Ok(evicted)
    }

    /// Apply the device cap to every user currently above it.
    ///
    /// Returns the total number of sessions evicted.
    pub async fn enforce_device_caps(&self, ctx: &RequestContext) -> Result<usize, AuthError> {
        let users = self
            .credentials
            .users_over_cap(self.policy.max_devices)
            .await?;
        let mut evicted = 0;
        for user_id in users {
            evicted += self.enforce_device_cap(user_id, ctx).await?.len();
        }
        Ok(evicted)
    }

    /// Delete rows past their expiry.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        Ok(self.credentials.purge_expired().await?)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn mint(
        &self,
        user_id: DbId,
        role: &str,
        session_id: SessionId,
        ip_address: Option<String>,
        user_agent: Option<String>,
        device_info: Option<serde_json::Value>,
    ) -> Result<Minted, AuthError> {
        let now = jwt::now();
        let jti = JtiPair::generate();

        let access = self
            .codec
            .sign_access(user_id, role, session_id, &jti.access, now)
            .map_err(signing_failed)?;
        let refresh = self
            .codec
            .sign_refresh(user_id, session_id, &jti.refresh, now)
            .map_err(signing_failed)?;
        let refresh_expires_at = now + Duration::days(REFRESH_TOKEN_TTL_DAYS);

        let row = CreateRefreshToken {
            user_id,
            token_hash: token_fingerprint(&refresh.token),
            jti: jti.refresh.clone(),
            session_id,
            expires_at: refresh_expires_at,
            ip_address,
            user_agent,
            device_info,
        };

        Ok(Minted {
            pair: TokenPair {
                access_token: access.token,
                refresh_token: refresh.token,
                session_id,
                expires_in: self.codec.access_ttl_secs(),
                refresh_expires_at,
            },
            row,
            jti,
        })
    }

    async fn refresh_failed(&self, user_id: Option<DbId>, reason: &str, ctx: &RequestContext) {
        tracing::debug!(?user_id, reason, "Refresh rejected");
        self.audit
            .log_auth_event(
                event_types::TOKEN_REFRESH_FAILED,
                user_id,
                "Refresh token rejected",
                json!({ "reason": reason }),
                ctx,
            )
            .await;
    }

    async fn reuse_detected(&self, row: &RefreshTokenRow, ctx: &RequestContext) {
        tracing::warn!(
            user_id = row.user_id,
            session_id = %row.session_id,
            "Revoked refresh token presented again"
        );
        self.audit
            .log_event(
                AuditEvent::new(
                    event_types::TOKEN_REUSE_DETECTED,
                    "Revoked refresh token was presented again",
                )
                .user(row.user_id)
                .severity(Severity::Critical)
                .metadata(json!({
                    "session_id": row.session_id,
                    "jti": row.jti,
                    "revocation_reason": row.revocation_reason,
                    "revoked_at": row.revoked_at,
                    "revoke_all": self.policy.revoke_all_on_reuse,
                })),
                ctx,
            )
            .await;

        if self.policy.revoke_all_on_reuse {
            self.contain_replay(row, ctx).await;
        }
    }

    /// Revoke every session of the user behind a replayed row.
    ///
    /// Rows already revoked by an earlier containment do not trigger another
    /// one, and a pass that finds nothing left to revoke is not audited.
    async fn contain_replay(&self, row: &RefreshTokenRow, ctx: &RequestContext) {
        if row.revocation_reason.as_deref() == Some(revocation_reasons::REUSE_DETECTED) {
            tracing::debug!(user_id = row.user_id, "Replay already contained");
            return;
        }

        match self
            .credentials
            .revoke_all_for_user(row.user_id, revocation_reasons::REUSE_DETECTED)
            .await
        {
            Ok(sessions) if sessions.is_empty() => {
                tracing::debug!(user_id = row.user_id, "No live sessions left to contain");
            }
            Ok(sessions) => {
                self.all_revoked(row.user_id, revocation_reasons::REUSE_DETECTED, &sessions, ctx)
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, user_id = row.user_id, "Replay containment failed");
            }
        }
    }

    async fn all_revoked(
        &self,
        user_id: DbId,
        reason: &str,
        sessions: &[SessionId],
        ctx: &RequestContext,
    ) {
        let count = sessions.len();
        tracing::warn!(user_id, count, reason, "Revoked all sessions");
        self.audit
            .log_event(
                AuditEvent::new(event_types::ALL_TOKENS_REVOKED, "All sessions revoked")
                    .user(user_id)
                    .metadata(json!({
                        "session_ids": sessions,
                        "session_count": count,
                        "reason": reason,
                    })),
                ctx,
            )
            .await;
    }

    /// Fetch the committed state of a row that lost a rotation race.
    ///
    /// Falls back to the stale copy marked as rotated when the row cannot be
    /// read again.
    async fn reread_revoked(&self, stale: RefreshTokenRow) -> RefreshTokenRow {
        match self.credentials.find_active_by_token(&stale.token_hash).await {
            Ok(Some(current)) if current.is_revoked => return current,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, user_id = stale.user_id, "Failed to re-read raced row");
            }
        }
        RefreshTokenRow {
            is_revoked: true,
            revocation_reason: Some(revocation_reasons::ROTATED.to_string()),
            ..stale
        }
    }
}

fn signing_failed(err: TokenError) -> AuthError {
    tracing::error!(error = %err, "Token signing failed");
    AuthError::Internal(err.to_string())
}
