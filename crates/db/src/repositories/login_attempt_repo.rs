//! Repository for the `login_attempts` table.

use haven_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::login_attempt::{CreateLoginAttempt, LoginAttempt};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, email, ip_address, success, failure_reason, user_agent, created_at";

/// Provides insert and windowed-count operations for login attempts.
pub struct LoginAttemptRepo;

impl LoginAttemptRepo {
    /// Append a login attempt, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateLoginAttempt,
    ) -> Result<LoginAttempt, sqlx::Error> {
        let query = format!(
            "INSERT INTO login_attempts (email, ip_address, success, failure_reason, user_agent)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LoginAttempt>(&query)
            .bind(&input.email)
            .bind(&input.ip_address)
            .bind(input.success)
            .bind(&input.failure_reason)
            .bind(&input.user_agent)
            .fetch_one(pool)
            .await
    }

    /// Count failed attempts since `since` whose email OR address matches.
    ///
    /// A `None` address only matches on email.
    pub async fn count_failures_since(
        pool: &PgPool,
        email: &str,
        ip_address: Option<&str>,
        since: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)::BIGINT FROM login_attempts
             WHERE success = false
               AND created_at >= $3
               AND (email = $1 OR ($2::TEXT IS NOT NULL AND ip_address = $2))",
        )
        .bind(email)
        .bind(ip_address)
        .bind(since)
        .fetch_one(pool)
        .await
    }
}
