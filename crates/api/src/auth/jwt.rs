//! Access and refresh token codec.
//!
//! Both token types are HS256-signed JWTs, each with its own secret. Claims
//! are modelled as a tagged [`Claims`] enum keyed on the `tokenType` claim, so
//! presenting one type where the other is expected is a distinct
//! [`TokenError::TypeMismatch`] rather than a string comparison at call sites.
//! Issuer and audience are validated on every decode.

use std::fmt;

use chrono::{Duration, Utc};
use haven_core::error::ConfigError;
use haven_core::tokens::{
    TokenType, ACCESS_TOKEN_TTL_MINS, MIN_SECRET_LEN, REFRESH_TOKEN_TTL_DAYS,
};
use haven_core::types::{DbId, SessionId, Timestamp};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Default `iss` claim.
const DEFAULT_ISSUER: &str = "haven-api";
/// Default `aud` claim.
const DEFAULT_AUDIENCE: &str = "haven-clients";

/// The single algorithm accepted by this deployment.
const ALGORITHM: Algorithm = Algorithm::HS256;

// ---------------------------------------------------------------------------
// Secrets and configuration
// ---------------------------------------------------------------------------

/// The two signing secrets, validated once at startup.
///
/// Each secret is at least [`MIN_SECRET_LEN`] bytes and the two differ.
#[derive(Clone)]
pub struct SigningSecrets {
    access: Vec<u8>,
    refresh: Vec<u8>,
}

impl SigningSecrets {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Result<Self, ConfigError> {
        let access = access.into();
        let refresh = refresh.into();

        check_secret("JWT_ACCESS_SECRET", &access)?;
        check_secret("JWT_REFRESH_SECRET", &refresh)?;
        if access == refresh {
            return Err(ConfigError::DuplicateSecrets);
        }

        Ok(Self {
            access: access.into_bytes(),
            refresh: refresh.into_bytes(),
        })
    }
}

fn check_secret(name: &'static str, secret: &str) -> Result<(), ConfigError> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(ConfigError::WeakSecret {
            name,
            min: MIN_SECRET_LEN,
            actual: secret.len(),
        });
    }
    Ok(())
}

impl fmt::Debug for SigningSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecrets")
            .field("access", &"[REDACTED]")
            .field("refresh", &"[REDACTED]")
            .finish()
    }
}

/// Configuration for token signing and validation.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secrets: SigningSecrets,
    /// Expected and emitted `iss` claim.
    pub issuer: String,
    /// Expected and emitted `aud` claim.
    pub audience: String,
}

impl JwtConfig {
    /// Load JWT configuration from environment variables.
    ///
    /// | Env Var              | Required | Default         |
    /// |----------------------|----------|-----------------|
    /// | `JWT_ACCESS_SECRET`  | **yes**  | --              |
    /// | `JWT_REFRESH_SECRET` | **yes**  | --              |
    /// | `JWT_ISSUER`         | no       | `haven-api`     |
    /// | `JWT_AUDIENCE`       | no       | `haven-clients` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let access = lookup("JWT_ACCESS_SECRET").ok_or(ConfigError::Missing("JWT_ACCESS_SECRET"))?;
        let refresh =
            lookup("JWT_REFRESH_SECRET").ok_or(ConfigError::Missing("JWT_REFRESH_SECRET"))?;

        Ok(Self {
            secrets: SigningSecrets::new(access, refresh)?,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Claims of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub user_id: DbId,
    pub role: String,
    pub session_id: SessionId,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    pub jti: String,
    pub iss: String,
    pub aud: String,
}

/// Claims of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    pub user_id: DbId,
    pub session_id: SessionId,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub iss: String,
    pub aud: String,
}

/// Claims of any token, tagged by the `tokenType` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tokenType", rename_all = "lowercase")]
pub enum Claims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
}

impl Claims {
    pub fn token_type(&self) -> TokenType {
        match self {
            Claims::Access(_) => TokenType::Access,
            Claims::Refresh(_) => TokenType::Refresh,
        }
    }
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct Signed<C> {
    pub token: String,
    pub claims: C,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of [`TokenCodec::verify`] and the signing functions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    #[error("token issuer or audience is invalid")]
    InvalidClaims,

    #[error("expected a {expected} token, got a {found} token")]
    TypeMismatch {
        expected: TokenType,
        found: TokenType,
    },

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Short machine-readable tag for audit metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::SignatureInvalid => "signature_invalid",
            TokenError::Expired => "expired",
            TokenError::InvalidClaims => "invalid_claims",
            TokenError::TypeMismatch { .. } => "type_mismatch",
            TokenError::Encoding(_) => "encoding",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::SignatureInvalid
            }
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::ImmatureSignature => TokenError::InvalidClaims,
            _ => TokenError::Malformed,
        }
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Signs and verifies access and refresh tokens.
///
/// Pure functions over immutable keys; cheap to share behind an `Arc`.
pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    issuer: String,
    audience: String,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access: KeyPair::from_secret(&config.secrets.access),
            refresh: KeyPair::from_secret(&config.secrets.refresh),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    /// Access token lifetime in seconds.
    pub fn access_ttl_secs(&self) -> i64 {
        ACCESS_TOKEN_TTL_MINS * 60
    }

    /// Sign an access token valid for 15 minutes from `now`.
    pub fn sign_access(
        &self,
        user_id: DbId,
        role: &str,
        session_id: SessionId,
        jti: &str,
        now: Timestamp,
    ) -> Result<Signed<AccessClaims>, TokenError> {
        let claims = AccessClaims {
            user_id,
            role: role.to_string(),
            session_id,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ACCESS_TOKEN_TTL_MINS)).timestamp(),
            jti: jti.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let signed = self.sign(Claims::Access(claims.clone()))?;
        Ok(Signed {
            token: signed,
            claims,
        })
    }

    /// Sign a refresh token valid for 7 days from `now`.
    pub fn sign_refresh(
        &self,
        user_id: DbId,
        session_id: SessionId,
        jti: &str,
        now: Timestamp,
    ) -> Result<Signed<RefreshClaims>, TokenError> {
        let claims = RefreshClaims {
            user_id,
            session_id,
            iat: now.timestamp(),
            exp: (now + Duration::days(REFRESH_TOKEN_TTL_DAYS)).timestamp(),
            jti: jti.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let signed = self.sign(Claims::Refresh(claims.clone()))?;
        Ok(Signed {
            token: signed,
            claims,
        })
    }

    /// Verify a token against the secret of `expected` and return its claims.
    ///
    /// Signature is checked first, then expiry, issuer and audience, then the
    /// `tokenType` tag.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let keys = self.keys(expected);
        let data = decode::<Claims>(token, &keys.decoding, &self.validation())?;
        let found = data.claims.token_type();
        if found != expected {
            return Err(TokenError::TypeMismatch { expected, found });
        }
        Ok(data.claims)
    }

    /// Verify an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        match self.verify(token, TokenType::Access)? {
            Claims::Access(claims) => Ok(claims),
            Claims::Refresh(_) => Err(TokenError::TypeMismatch {
                expected: TokenType::Access,
                found: TokenType::Refresh,
            }),
        }
    }

    /// Verify a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        match self.verify(token, TokenType::Refresh)? {
            Claims::Refresh(claims) => Ok(claims),
            Claims::Access(_) => Err(TokenError::TypeMismatch {
                expected: TokenType::Refresh,
                found: TokenType::Access,
            }),
        }
    }

    fn sign(&self, claims: Claims) -> Result<String, TokenError> {
        let keys = self.keys(claims.token_type());
        encode(&Header::new(ALGORITHM), &claims, &keys.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn keys(&self, token_type: TokenType) -> &KeyPair {
        match token_type {
            TokenType::Access => &self.access,
            TokenType::Refresh => &self.refresh,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = 0;
        validation
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

/// Current time, truncated to whole seconds as stored in `iat`/`exp`.
pub fn now() -> Timestamp {
    let now = Utc::now();
    now - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()))
}
