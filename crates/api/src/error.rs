use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use haven_core::error::{AuthError, CoreError};
use haven_db::StoreError;
use serde_json::json;

/// The one message clients see for any authentication failure.
pub const UNAUTHENTICATED_MESSAGE: &str = "Session expired. Please log in again.";

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent JSON error responses of
/// the form `{ "error": ..., "code": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `haven_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An outcome of the session or access-verification protocols.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A storage error outside the session protocols (e.g. login lookups).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// The uniform authentication failure.
    pub fn unauthenticated() -> Self {
        AppError::Auth(AuthError::InvalidToken)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Unauthorized(_) => unauthenticated(),
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::TooManyRequests(msg) => {
                    (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS", msg.clone())
                }
            },

            // --- Session protocol outcomes ---
            AppError::Auth(auth) => {
                if auth.is_authentication_failure() {
                    tracing::debug!(outcome = %auth, "Authentication failed");
                    unauthenticated()
                } else {
                    tracing::error!(error = %auth, "Authentication infrastructure failure");
                    internal()
                }
            }

            AppError::Store(err) => {
                tracing::error!(error = %err, "Store error");
                internal()
            }

            // --- HTTP-specific errors ---
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn unauthenticated() -> (StatusCode, &'static str, String) {
    (
        StatusCode::UNAUTHORIZED,
        "UNAUTHENTICATED",
        UNAUTHENTICATED_MESSAGE.to_string(),
    )
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
