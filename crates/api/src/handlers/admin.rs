//! Handlers for administrative session management.
//!
//! All handlers require the `admin` role via [`RequireAdmin`].

use axum::extract::{Path, State};
use axum::Json;
use haven_core::tokens::revocation_reasons;
use haven_core::types::DbId;
use haven_db::models::refresh_token::SessionSummary;

use super::auth::RevokedResponse;
use crate::error::AppResult;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/admin/users/{id}/sessions
///
/// List another user's sessions. Recorded as a `data_access` event.
pub async fn list_user_sessions(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(user_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<SessionSummary>>>> {
    let sessions = state.sessions.get_user_sessions(user_id).await?;
    state
        .audit
        .log_data_access(admin.user_id, "user_sessions", Some(user_id), &admin.context)
        .await;
    Ok(Json(DataResponse { data: sessions }))
}

/// POST /api/v1/admin/users/{id}/revoke-sessions
///
/// Revoke every session of a user.
pub async fn revoke_user_sessions(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(user_id): Path<DbId>,
) -> AppResult<Json<DataResponse<RevokedResponse>>> {
    let revoked_count = state
        .sessions
        .revoke_all(user_id, revocation_reasons::ADMIN_REVOKED, &admin.context)
        .await?;
    tracing::info!(admin_id = admin.user_id, user_id, revoked_count, "Admin revoked sessions");
    Ok(Json(DataResponse {
        data: RevokedResponse { revoked_count },
    }))
}
