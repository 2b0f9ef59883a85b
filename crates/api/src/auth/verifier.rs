//! Per-request access token verification.

use std::sync::Arc;

use haven_core::error::AuthError;
use haven_core::security_events::event_types;
use haven_core::types::{DbId, SessionId};
use haven_db::store::IdentityStore;
use serde_json::json;

use super::audit::{AuditEvent, AuditLogger};
use super::context::RequestContext;
use super::jwt::{TokenCodec, TokenError};

/// Identity established by a valid access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAccess {
    pub user_id: DbId,
    /// Role read from the identity store during verification, not the token.
    pub role: String,
    pub session_id: SessionId,
    pub jti: String,
}

/// Validates access tokens against the codec and live user status.
///
/// The user's status is re-read on every call, so deactivation or demotion
/// takes effect on the next request rather than at token expiry.
#[derive(Clone)]
pub struct AccessVerifier {
    codec: Arc<TokenCodec>,
    identity: Arc<dyn IdentityStore>,
    audit: AuditLogger,
}

impl AccessVerifier {
    pub fn new(codec: Arc<TokenCodec>, identity: Arc<dyn IdentityStore>, audit: AuditLogger) -> Self {
        Self {
            codec,
            identity,
            audit,
        }
    }

    pub async fn verify(
        &self,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<VerifiedAccess, AuthError> {
        let claims = match self.codec.verify_access(token) {
            Ok(claims) => claims,
            Err(TokenError::SignatureInvalid) => {
                self.audit
                    .log_event(
                        AuditEvent::new(
                            event_types::INVALID_TOKEN_SIGNATURE,
                            "Access token failed signature verification",
                        )
                        .metadata(json!({ "expected": "access" })),
                        ctx,
                    )
                    .await;
                return Err(AuthError::InvalidToken);
            }
            // Expiry and malformed tokens are routine and not audited.
            Err(_) => return Err(AuthError::InvalidToken),
        };

        match self
            .identity
            .get_user_active_status_and_role(claims.user_id)
            .await?
        {
            Some(status) if status.is_active => Ok(VerifiedAccess {
                user_id: claims.user_id,
                role: status.role,
                session_id: claims.session_id,
                jti: claims.jti,
            }),
            _ => {
                tracing::debug!(user_id = claims.user_id, "Access token for inactive user");
                Err(AuthError::UserInactive)
            }
        }
    }
}
