use haven_core::error::AuthError;

/// Errors raised by any storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The backend could not be reached (non-SQL backends).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A write collided with a uniqueness constraint.
    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Like the `From` conversion, but reports unique violations as
    /// [`StoreError::Conflict`].
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(db) if db.is_unique_violation() => StoreError::Conflict(db.message().to_string()),
            _ => StoreError::Database(err),
        }
    }
}

/// A store failure is never an authentication outcome.
impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Credential store failure");
        AuthError::StoreFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_become_store_failures() {
        let err: AuthError = StoreError::Unavailable("pool closed".into()).into();
        assert!(matches!(err, AuthError::StoreFailure(ref msg) if msg.contains("pool closed")));
        assert!(!err.is_authentication_failure());
    }

    #[test]
    fn non_database_sqlx_errors_stay_database_errors() {
        assert!(matches!(
            StoreError::from_sqlx(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }
}
