//! Read models over the identity tables owned by the wider application.

use haven_core::types::DbId;
use sqlx::FromRow;

/// Current activation state and role of a user.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserStatus {
    pub is_active: bool,
    pub role: String,
}

/// Everything the login flow needs to authenticate an email/password pair.
#[derive(Debug, Clone, FromRow)]
pub struct LoginCredentials {
    pub user_id: DbId,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub role: String,
}
