//! Token lifetimes, type tags, identifiers and revocation reasons.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access token lifetime in minutes.
pub const ACCESS_TOKEN_TTL_MINS: i64 = 15;

/// Refresh token lifetime in days.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Default number of non-revoked refresh tokens retained per user.
pub const DEFAULT_MAX_DEVICES: usize = 5;

/// Minimum length in bytes of each signing secret.
pub const MIN_SECRET_LEN: usize = 64;

/// `jti` prefix for access tokens.
pub const ACCESS_JTI_PREFIX: &str = "at_";

/// `jti` prefix for refresh tokens.
pub const REFRESH_JTI_PREFIX: &str = "rt_";

/// The `tokenType` claim carried by every signed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pair of `jti` values minted from one random root.
///
/// Both tokens of a pair share the root so audit trails can correlate them,
/// while the prefixes keep access and refresh identifiers disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JtiPair {
    pub root: String,
    pub access: String,
    pub refresh: String,
}

impl JtiPair {
    pub fn generate() -> Self {
        let root = Uuid::new_v4().simple().to_string();
        Self {
            access: format!("{ACCESS_JTI_PREFIX}{root}"),
            refresh: format!("{REFRESH_JTI_PREFIX}{root}"),
            root,
        }
    }
}

/// Reasons recorded in `revocation_reason`.
pub mod revocation_reasons {
    pub const ROTATED: &str = "rotated";
    pub const LOGOUT: &str = "logout";
    pub const LOGOUT_ALL: &str = "logout_all";
    pub const DEVICE_CAP: &str = "device_cap_exceeded";
    pub const REUSE_DETECTED: &str = "reuse_detected";
    pub const ADMIN_REVOKED: &str = "admin_revoked";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jti_pair_shares_root_with_distinct_prefixes() {
        let pair = JtiPair::generate();
        assert!(pair.access.starts_with(ACCESS_JTI_PREFIX));
        assert!(pair.refresh.starts_with(REFRESH_JTI_PREFIX));
        assert!(pair.access.ends_with(&pair.root));
        assert!(pair.refresh.ends_with(&pair.root));
        assert_ne!(pair.access, pair.refresh);
    }

    #[test]
    fn jti_pairs_are_unique() {
        let a = JtiPair::generate();
        let b = JtiPair::generate();
        assert_ne!(a.root, b.root);
    }

    #[test]
    fn token_type_wire_format() {
        assert_eq!(
            serde_json::to_string(&TokenType::Access).unwrap(),
            "\"access\""
        );
        assert_eq!(
            serde_json::from_str::<TokenType>("\"refresh\"").unwrap(),
            TokenType::Refresh
        );
        assert!(serde_json::from_str::<TokenType>("\"Refresh\"").is_err());
    }
}
