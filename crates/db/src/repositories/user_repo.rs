//! Read-only queries over the `users` and `roles` tables.

use haven_core::types::DbId;
use sqlx::PgPool;

use crate::models::user::{LoginCredentials, UserStatus};

/// Provides the identity-store lookups used by token verification and login.
pub struct UserRepo;

impl UserRepo {
    /// Current activation status and role name of a user.
    pub async fn find_status(pool: &PgPool, id: DbId) -> Result<Option<UserStatus>, sqlx::Error> {
        sqlx::query_as::<_, UserStatus>(
            "SELECT u.is_active, r.name AS role
             FROM users u
             JOIN roles r ON r.id = u.role_id
             WHERE u.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Login credentials by email (case-insensitive).
    pub async fn find_credentials_by_email(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<LoginCredentials>, sqlx::Error> {
        sqlx::query_as::<_, LoginCredentials>(
            "SELECT u.id AS user_id, u.email, u.password_hash, u.is_active, r.name AS role
             FROM users u
             JOIN roles r ON r.id = u.role_id
             WHERE LOWER(u.email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }
}
