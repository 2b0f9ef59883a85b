//! Bearer access-token extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use haven_core::error::CoreError;
use haven_core::types::{DbId, SessionId};

use super::request_context::context_from_parts;
use crate::auth::context::RequestContext;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user extracted from the `Authorization: Bearer` header.
///
/// The token is checked by the [`AccessVerifier`](crate::auth::verifier::AccessVerifier),
/// so `role` is the user's current role, not the one in the token.
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = user.user_id, role = %user.role, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: DbId,
    pub role: String,
    pub session_id: SessionId,
    pub jti: String,
    /// Client metadata of the request that carried the token.
    pub context: RequestContext,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing or malformed Authorization header".into(),
                ))
            })?;

        let context = context_from_parts(parts);
        let verified = state.verifier.verify(token, &context).await?;

        Ok(AuthUser {
            user_id: verified.user_id,
            role: verified.role,
            session_id: verified.session_id,
            jti: verified.jti,
            context,
        })
    }
}
