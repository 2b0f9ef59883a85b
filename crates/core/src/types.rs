/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Logical session identifier shared by every refresh token in one rotation chain.
pub type SessionId = uuid::Uuid;
