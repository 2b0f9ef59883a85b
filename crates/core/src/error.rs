//! Error taxonomy shared across the workspace.

/// Generic domain errors surfaced by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),
}

/// Outcome errors of the session and access-verification protocols.
///
/// `InvalidToken`, `TokenRevoked` and `UserInactive` are expected
/// authentication outcomes. `StoreFailure` and `Internal` are fatal for the
/// request: no decision about the credential was made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Malformed, badly signed, expired, wrong type, or unknown to the store.
    #[error("invalid token")]
    InvalidToken,

    /// A previously valid refresh token was presented after revocation or rotation.
    #[error("token has been revoked")]
    TokenRevoked,

    /// The owning user is deactivated or no longer exists.
    #[error("user is inactive")]
    UserInactive,

    /// Persistence layer unreachable or transaction aborted.
    #[error("credential store failure: {0}")]
    StoreFailure(String),

    /// Token signing or encoding failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this is an authentication outcome (as opposed to an outage).
    pub fn is_authentication_failure(&self) -> bool {
        !matches!(self, AuthError::StoreFailure(_) | AuthError::Internal(_))
    }
}

/// Startup configuration errors. Any of these must stop the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in the environment")]
    Missing(&'static str),

    #[error("{name} must be at least {min} bytes long (got {actual})")]
    WeakSecret {
        name: &'static str,
        min: usize,
        actual: usize,
    },

    #[error("access and refresh signing secrets must differ")]
    DuplicateSecrets,

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failure_is_not_an_authentication_outcome() {
        assert!(AuthError::InvalidToken.is_authentication_failure());
        assert!(AuthError::TokenRevoked.is_authentication_failure());
        assert!(AuthError::UserInactive.is_authentication_failure());
        assert!(!AuthError::StoreFailure("down".into()).is_authentication_failure());
        assert!(!AuthError::Internal("encode".into()).is_authentication_failure());
    }

    #[test]
    fn weak_secret_message_names_the_variable() {
        let err = ConfigError::WeakSecret {
            name: "JWT_ACCESS_SECRET",
            min: 64,
            actual: 10,
        };
        assert!(err.to_string().contains("JWT_ACCESS_SECRET"));
        assert!(err.to_string().contains("64"));
    }
}
