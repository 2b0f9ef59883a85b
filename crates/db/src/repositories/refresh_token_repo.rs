//! Repository for the `refresh_tokens` table.

use haven_core::types::{DbId, SessionId};
use sqlx::{PgExecutor, PgPool};

use crate::models::refresh_token::{CreateRefreshToken, RefreshTokenRow, RotateOutcome};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, token_hash, jti, session_id, expires_at, ip_address, \
                       user_agent, device_info, is_revoked, revoked_at, revocation_reason, \
                       created_at";

/// Provides the credential-store queries for refresh tokens.
pub struct RefreshTokenRepo;

impl RefreshTokenRepo {
    /// Insert a new row, returning it.
    ///
    /// Accepts any executor so rotation can insert inside its transaction.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        input: &CreateRefreshToken,
    ) -> Result<RefreshTokenRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO refresh_tokens
                (user_id, token_hash, jti, session_id, expires_at, ip_address, user_agent, device_info)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RefreshTokenRow>(&query)
            .bind(input.user_id)
            .bind(&input.token_hash)
            .bind(&input.jti)
            .bind(input.session_id)
            .bind(input.expires_at)
            .bind(&input.ip_address)
            .bind(&input.user_agent)
            .bind(&input.device_info)
            .fetch_one(executor)
            .await
    }

    /// Find an unexpired row by token fingerprint. Revoked rows are returned.
    pub async fn find_unexpired_by_hash(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM refresh_tokens
             WHERE token_hash = $1
               AND expires_at > NOW()"
        );
        sqlx::query_as::<_, RefreshTokenRow>(&query)
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Revoke a single row. Returns the row only if this call flipped it.
    pub async fn revoke(
        pool: &PgPool,
        token_hash: &str,
        reason: &str,
    ) -> Result<Option<RefreshTokenRow>, sqlx::Error> {
        let query = format!(
            "UPDATE refresh_tokens
             SET is_revoked = true, revoked_at = NOW(), revocation_reason = $2
             WHERE token_hash = $1 AND is_revoked = false
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RefreshTokenRow>(&query)
            .bind(token_hash)
            .bind(reason)
            .fetch_optional(pool)
            .await
    }

    /// Revoke all non-revoked rows of a user, returning their session ids.
    pub async fn revoke_all_for_user(
        pool: &PgPool,
        user_id: DbId,
        reason: &str,
    ) -> Result<Vec<SessionId>, sqlx::Error> {
        sqlx::query_scalar::<_, SessionId>(
            "UPDATE refresh_tokens
             SET is_revoked = true, revoked_at = NOW(), revocation_reason = $2
             WHERE user_id = $1 AND is_revoked = false
             RETURNING session_id",
        )
        .bind(user_id)
        .bind(reason)
        .fetch_all(pool)
        .await
    }

    /// Revoke all but the `keep` newest non-revoked rows of a user.
    pub async fn revoke_beyond_newest(
        pool: &PgPool,
        user_id: DbId,
        keep: i64,
        reason: &str,
    ) -> Result<Vec<SessionId>, sqlx::Error> {
        sqlx::query_scalar::<_, SessionId>(
            "UPDATE refresh_tokens
             SET is_revoked = true, revoked_at = NOW(), revocation_reason = $3
             WHERE id IN (
                 SELECT id FROM refresh_tokens
                 WHERE user_id = $1 AND is_revoked = false
                 ORDER BY created_at DESC, id DESC
                 OFFSET $2
             )
             RETURNING session_id",
        )
        .bind(user_id)
        .bind(keep)
        .bind(reason)
        .fetch_all(pool)
        .await
    }

    /// Revoke the presented row and insert its replacement in one transaction.
    ///
    /// The conditional UPDATE takes the row lock, so of two concurrent
    /// rotations of the same token exactly one sees `rows_affected == 1`.
    pub async fn rotate(
        pool: &PgPool,
        presented_hash: &str,
        reason: &str,
        replacement: &CreateRefreshToken,
    ) -> Result<RotateOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens
             SET is_revoked = true, revoked_at = NOW(), revocation_reason = $2
             WHERE token_hash = $1 AND is_revoked = false AND expires_at > NOW()",
        )
        .bind(presented_hash)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            let existing = sqlx::query_scalar::<_, bool>(
                "SELECT is_revoked FROM refresh_tokens
                 WHERE token_hash = $1 AND expires_at > NOW()",
            )
            .bind(presented_hash)
            .fetch_optional(&mut *tx)
            .await?;
            tx.rollback().await?;

            return Ok(match existing {
                Some(true) => RotateOutcome::AlreadyRevoked,
                _ => RotateOutcome::NotFound,
            });
        }

        let row = Self::create(&mut *tx, replacement).await?;
        tx.commit().await?;
        Ok(RotateOutcome::Rotated(row))
    }

    /// Unexpired rows of a user, newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<RefreshTokenRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM refresh_tokens
             WHERE user_id = $1 AND expires_at > NOW()
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, RefreshTokenRow>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Users with more than `keep` non-revoked rows.
    pub async fn users_over_cap(pool: &PgPool, keep: i64) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT user_id FROM refresh_tokens
             WHERE is_revoked = false
             GROUP BY user_id
             HAVING COUNT(*) > $1",
        )
        .bind(keep)
        .fetch_all(pool)
        .await
    }

    /// Delete rows past their expiry. Returns the count of deleted rows.
    pub async fn delete_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
