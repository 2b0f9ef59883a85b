pub mod admin;
pub mod auth;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /auth/login                          login (public)
/// /auth/refresh                        rotate refresh token (public)
/// /auth/logout                         revoke refresh token (public)
/// /auth/logout-all                     revoke all own sessions (auth)
/// /auth/sessions                       list own sessions (auth)
///
/// /admin/users/{id}/sessions           list a user's sessions (admin)
/// /admin/users/{id}/revoke-sessions    revoke a user's sessions (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/admin", admin::router())
}
