use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use haven_core::types::DbId;
use haven_db::models::login_attempt::CreateLoginAttempt;
use haven_db::models::refresh_token::{CreateRefreshToken, RotateOutcome};
use haven_db::pg::{PgCredentialStore, PgLoginAttemptStore};
use haven_db::store::{CredentialStore, LoginAttemptStore};
use haven_db::StoreError;
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_user(pool: &PgPool, email: &str) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, role_id)
         SELECT $1, 'not-a-hash', id FROM roles WHERE name = 'member'
         RETURNING id",
    )
    .bind(email)
    .fetch_one(pool)
    .await
    .unwrap()
}

fn new_row(user_id: DbId, hash: &str) -> CreateRefreshToken {
    CreateRefreshToken {
        user_id,
        token_hash: hash.to_string(),
        jti: format!("rt_{hash}"),
        session_id: Uuid::new_v4(),
        expires_at: Utc::now() + Duration::days(7),
        ip_address: Some("10.0.0.1".into()),
        user_agent: Some("test-agent".into()),
        device_info: None,
    }
}

fn failed_attempt(email: &str, ip: Option<&str>) -> CreateLoginAttempt {
    CreateLoginAttempt {
        email: email.to_string(),
        ip_address: ip.map(str::to_string),
        success: false,
        failure_reason: Some("invalid_password".into()),
        user_agent: None,
    }
}

#[sqlx::test]
async fn rotate_revokes_presented_row_and_inserts_replacement(pool: PgPool) {
    let user = seed_user(&pool, "rotate@example.com").await;
    let store = PgCredentialStore::new(pool.clone());
    store.insert(new_row(user, "old")).await.unwrap();

    let outcome = store.rotate("old", "rotated", new_row(user, "new")).await.unwrap();
    assert_matches!(outcome, RotateOutcome::Rotated(row) if row.token_hash == "new" && !row.is_revoked);

    let old = store.find_active_by_token("old").await.unwrap().unwrap();
    assert!(old.is_revoked);
    assert_eq!(old.revocation_reason.as_deref(), Some("rotated"));
    assert!(old.revoked_at.is_some());

    let again = store.rotate("old", "rotated", new_row(user, "newer")).await.unwrap();
    assert_matches!(again, RotateOutcome::AlreadyRevoked);
    // The losing rotation inserted nothing.
    assert!(store.find_active_by_token("newer").await.unwrap().is_none());

    let unknown = store.rotate("missing", "rotated", new_row(user, "other")).await.unwrap();
    assert_matches!(unknown, RotateOutcome::NotFound);
}

#[sqlx::test]
async fn rotate_treats_expired_rows_as_missing(pool: PgPool) {
    let user = seed_user(&pool, "expired@example.com").await;
    let store = PgCredentialStore::new(pool.clone());
    let mut expired = new_row(user, "stale");
    expired.expires_at = Utc::now() - Duration::minutes(1);
    store.insert(expired).await.unwrap();

    let outcome = store.rotate("stale", "rotated", new_row(user, "fresh")).await.unwrap();
    assert_matches!(outcome, RotateOutcome::NotFound);
    assert_eq!(store.purge_expired().await.unwrap(), 1);
}

#[sqlx::test]
async fn rotate_conflict_rolls_back_the_revocation(pool: PgPool) {
    let user = seed_user(&pool, "conflict@example.com").await;
    let store = PgCredentialStore::new(pool.clone());
    store.insert(new_row(user, "taken")).await.unwrap();
    store.insert(new_row(user, "presented")).await.unwrap();

    let result = store.rotate("presented", "rotated", new_row(user, "taken")).await;
    assert_matches!(result, Err(StoreError::Conflict(_)));

    let presented = store.find_active_by_token("presented").await.unwrap().unwrap();
    assert!(!presented.is_revoked);
}

#[sqlx::test]
async fn duplicate_insert_is_a_conflict(pool: PgPool) {
    let user = seed_user(&pool, "dup@example.com").await;
    let store = PgCredentialStore::new(pool.clone());
    store.insert(new_row(user, "h1")).await.unwrap();

    assert_matches!(store.insert(new_row(user, "h1")).await, Err(StoreError::Conflict(_)));
}

#[sqlx::test]
async fn device_cap_keeps_the_newest_rows(pool: PgPool) {
    let user = seed_user(&pool, "cap@example.com").await;
    let other = seed_user(&pool, "other@example.com").await;
    let store = PgCredentialStore::new(pool.clone());

    let mut sessions = Vec::new();
    for hash in ["t1", "t2", "t3", "t4"] {
        let row = store.insert(new_row(user, hash)).await.unwrap();
        sessions.push(row.session_id);
    }
    store.insert(new_row(other, "o1")).await.unwrap();

    assert_eq!(store.users_over_cap(2).await.unwrap(), vec![user]);

    let evicted = store.enforce_device_cap(user, 2, "device_limit").await.unwrap();
    assert_eq!(evicted.len(), 2);
    assert!(evicted.contains(&sessions[0]));
    assert!(evicted.contains(&sessions[1]));

    let rows = store.list_for_user(user).await.unwrap();
    let active: Vec<&str> = rows
        .iter()
        .filter(|r| !r.is_revoked)
        .map(|r| r.token_hash.as_str())
        .collect();
    assert_eq!(active, vec!["t4", "t3"]);

    // Already under the cap: nothing more to evict.
    assert!(store.enforce_device_cap(user, 2, "device_limit").await.unwrap().is_empty());
    assert!(store.users_over_cap(2).await.unwrap().is_empty());
    assert!(!store.find_active_by_token("o1").await.unwrap().unwrap().is_revoked);
}

#[sqlx::test]
async fn revoked_rows_cannot_be_unrevoked(pool: PgPool) {
    let user = seed_user(&pool, "monotonic@example.com").await;
    let store = PgCredentialStore::new(pool.clone());
    store.insert(new_row(user, "h1")).await.unwrap();
    store.revoke("h1", "logout").await.unwrap().unwrap();

    let result = sqlx::query(
        "UPDATE refresh_tokens
         SET is_revoked = false, revoked_at = NULL, revocation_reason = NULL
         WHERE token_hash = 'h1'",
    )
    .execute(&pool)
    .await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("cannot be un-revoked"), "{err}");

    let row = store.find_active_by_token("h1").await.unwrap().unwrap();
    assert!(row.is_revoked);
}

#[sqlx::test]
async fn failure_count_matches_email_or_address_within_window(pool: PgPool) {
    let store = PgLoginAttemptStore::new(pool.clone());

    store.record(failed_attempt("a@example.com", Some("10.0.0.1"))).await.unwrap();
    store.record(failed_attempt("b@example.com", Some("10.0.0.1"))).await.unwrap();
    store.record(failed_attempt("c@example.com", Some("10.0.0.9"))).await.unwrap();
    let mut success = failed_attempt("a@example.com", Some("10.0.0.1"));
    success.success = true;
    success.failure_reason = None;
    store.record(success).await.unwrap();

    // Outside the window.
    sqlx::query(
        "INSERT INTO login_attempts (email, ip_address, success, failure_reason, created_at)
         VALUES ('a@example.com', '10.0.0.1', false, 'invalid_password', NOW() - INTERVAL '1 hour')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let since = Utc::now() - Duration::minutes(15);
    assert_eq!(
        store.count_failures_since("a@example.com", Some("10.0.0.1"), since).await.unwrap(),
        2
    );
    assert_eq!(store.count_failures_since("a@example.com", None, since).await.unwrap(), 1);
    assert_eq!(
        store.count_failures_since("new@example.com", Some("10.0.0.9"), since).await.unwrap(),
        1
    );
    let wide = Utc::now() - Duration::hours(2);
    assert_eq!(store.count_failures_since("a@example.com", None, wide).await.unwrap(), 2);
}
