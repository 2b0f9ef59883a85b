//! Handlers for the `/auth` resource (login, refresh, logout, sessions).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use haven_core::brute_force::failure_reasons;
use haven_core::error::CoreError;
use haven_core::security_events::event_types;
use haven_core::tokens::revocation_reasons;
use haven_core::types::{DbId, SessionId, Timestamp};
use haven_db::models::refresh_token::SessionSummary;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::context::RequestContext;
use crate::auth::password::{verify_against_dummy, verify_password};
use crate::auth::session::TokenPair;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::request_context::ClientContext;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Opaque device metadata stored with the session.
    pub device_info: Option<serde_json::Value>,
}

/// Request body for `POST /auth/refresh` and `POST /auth/logout`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Successful authentication response returned by login and refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: SessionId,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub refresh_expires_at: Timestamp,
    pub user_id: DbId,
    pub role: String,
}

impl AuthResponse {
    fn new(tokens: TokenPair, user_id: DbId, role: String) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            session_id: tokens.session_id,
            expires_in: tokens.expires_in,
            refresh_expires_at: tokens.refresh_expires_at,
            user_id,
            role,
        }
    }
}

/// Response body for bulk revocations.
#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    pub revoked_count: usize,
}

/// Response body for `GET /auth/sessions`.
#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub current_session_id: SessionId,
    pub sessions: Vec<SessionSummary>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/login
///
/// Authenticate with email + password. Every outcome is recorded as a login
/// attempt and an audit event. All credential failures produce the same 401.
pub async fn login(
    State(state): State<AppState>,
    ClientContext(mut ctx): ClientContext,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    if input.device_info.is_some() {
        ctx.device_info = input.device_info.clone();
    }
    let email = input.email.trim().to_lowercase();

    // 1. Brute-force gate.
    let check = state
        .brute_force
        .check(&email, ctx.ip_address.as_deref())
        .await?;
    if check.is_over {
        state
            .brute_force
            .record_attempt(&email, false, Some(failure_reasons::TOO_MANY_ATTEMPTS), &ctx)
            .await?;
        state
            .audit
            .log_auth_event(
                event_types::BRUTE_FORCE_DETECTED,
                None,
                "Login blocked after repeated failures",
                json!({ "failure_count": check.count, "email": email }),
                &ctx,
            )
            .await;
        return Err(AppError::Core(CoreError::TooManyRequests(
            "Too many failed login attempts. Try again later.".into(),
        )));
    }

    // 2. Credentials.
    let Some(credentials) = state.identity.find_login_credentials(&email).await? else {
        verify_against_dummy(&input.password);
        return Err(login_failed(&state, &email, None, failure_reasons::UNKNOWN_USER, &ctx).await?);
    };

    let password_valid = verify_password(&input.password, &credentials.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    if !password_valid {
        let user_id = Some(credentials.user_id);
        return Err(
            login_failed(&state, &email, user_id, failure_reasons::INVALID_PASSWORD, &ctx).await?,
        );
    }
    if !credentials.is_active {
        let user_id = Some(credentials.user_id);
        return Err(
            login_failed(&state, &email, user_id, failure_reasons::ACCOUNT_INACTIVE, &ctx).await?,
        );
    }

    // 3. Success.
    state.brute_force.record_attempt(&email, true, None, &ctx).await?;
    state
        .audit
        .log_auth_event(
            event_types::LOGIN_SUCCESS,
            Some(credentials.user_id),
            "Login succeeded",
            json!({}),
            &ctx,
        )
        .await;

    let tokens = state
        .sessions
        .issue(credentials.user_id, &credentials.role, None, &ctx)
        .await?;

    Ok(Json(AuthResponse::new(
        tokens,
        credentials.user_id,
        credentials.role,
    )))
}

/// POST /api/v1/auth/refresh
///
/// Exchange a refresh token for a new pair on the same session.
pub async fn refresh(
    State(state): State<AppState>,
    ClientContext(ctx): ClientContext,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let rotated = state.sessions.rotate(&input.refresh_token, &ctx).await?;
    Ok(Json(AuthResponse::new(
        rotated.tokens,
        rotated.user_id,
        rotated.role,
    )))
}

/// POST /api/v1/auth/logout
///
/// Revoke the presented refresh token. Idempotent: always 204.
pub async fn logout(
    State(state): State<AppState>,
    ClientContext(ctx): ClientContext,
    Json(input): Json<RefreshRequest>,
) -> AppResult<StatusCode> {
    let revoked = state
        .sessions
        .revoke(&input.refresh_token, revocation_reasons::LOGOUT, &ctx)
        .await?;
    tracing::debug!(revoked, "Logout processed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/logout-all
///
/// Revoke every session of the authenticated user.
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DataResponse<RevokedResponse>>> {
    let revoked_count = state
        .sessions
        .revoke_all(user.user_id, revocation_reasons::LOGOUT_ALL, &user.context)
        .await?;
    Ok(Json(DataResponse {
        data: RevokedResponse { revoked_count },
    }))
}

/// GET /api/v1/auth/sessions
///
/// List the authenticated user's unexpired sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DataResponse<SessionsResponse>>> {
    let sessions = state.sessions.get_user_sessions(user.user_id).await?;
    Ok(Json(DataResponse {
        data: SessionsResponse {
            current_session_id: user.session_id,
            sessions,
        },
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Record a failed login and build the uniform rejection.
async fn login_failed(
    state: &AppState,
    email: &str,
    user_id: Option<DbId>,
    reason: &'static str,
    ctx: &RequestContext,
) -> AppResult<AppError> {
    state
        .brute_force
        .record_attempt(email, false, Some(reason), ctx)
        .await?;
    state
        .audit
        .log_auth_event(
            event_types::LOGIN_FAILED,
            user_id,
            "Login failed",
            json!({ "reason": reason, "email": email }),
            ctx,
        )
        .await;
    Ok(AppError::unauthenticated())
}
