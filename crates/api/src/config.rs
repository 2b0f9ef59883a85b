use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use haven_core::brute_force::{
    BruteForcePolicy, DEFAULT_THRESHOLD, DEFAULT_WINDOW_MINS, MAX_WINDOW_MINS,
};
use haven_core::error::ConfigError;
use haven_core::tokens::DEFAULT_MAX_DEVICES;

use crate::auth::jwt::JwtConfig;
use crate::auth::session::SessionPolicy;

/// Default interval between token janitor runs.
const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 3600;

/// Server configuration loaded from environment variables.
///
/// Everything except the signing secrets has a default suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    ///
    /// See [`JwtConfig::from_env`] and [`SessionConfig::from_env`] for the rest.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "PORT", 3000u16)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30u64)?;

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_lookup(&lookup)?,
            session: SessionConfig::from_lookup(&lookup)?,
        })
    }
}

/// Session, brute-force and janitor tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub policy: SessionPolicy,
    pub brute_force: BruteForcePolicy,
    pub janitor_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::default(),
            brute_force: BruteForcePolicy::default(),
            janitor_interval: Duration::from_secs(DEFAULT_JANITOR_INTERVAL_SECS),
        }
    }
}

impl SessionConfig {
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `SESSION_MAX_DEVICES`         | `5`     |
    /// | `SESSION_REVOKE_ALL_ON_REUSE` | `false` |
    /// | `BRUTE_FORCE_WINDOW_MINS`     | `15`    |
    /// | `BRUTE_FORCE_THRESHOLD`       | `5`     |
    /// | `TOKEN_JANITOR_INTERVAL_SECS` | `3600`  |
    ///
    /// The window is limited to `1..=MAX_WINDOW_MINS`; the threshold, device
    /// cap and janitor interval must be non-zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_devices = parse_or(&lookup, "SESSION_MAX_DEVICES", DEFAULT_MAX_DEVICES)?;
        if max_devices == 0 {
            return Err(ConfigError::Invalid {
                name: "SESSION_MAX_DEVICES",
                value: "0".into(),
            });
        }
        let revoke_all_on_reuse = parse_or(&lookup, "SESSION_REVOKE_ALL_ON_REUSE", false)?;
        let window_mins = parse_or(&lookup, "BRUTE_FORCE_WINDOW_MINS", DEFAULT_WINDOW_MINS)?;
        let window = (1..=MAX_WINDOW_MINS)
            .contains(&window_mins)
            .then(|| TimeDelta::try_minutes(window_mins))
            .flatten()
            .ok_or_else(|| ConfigError::Invalid {
                name: "BRUTE_FORCE_WINDOW_MINS",
                value: window_mins.to_string(),
            })?;
        let threshold = parse_or(&lookup, "BRUTE_FORCE_THRESHOLD", DEFAULT_THRESHOLD)?;
        if threshold == 0 {
            return Err(ConfigError::Invalid {
                name: "BRUTE_FORCE_THRESHOLD",
                value: "0".into(),
            });
        }
        let janitor_secs = parse_or(
            &lookup,
            "TOKEN_JANITOR_INTERVAL_SECS",
            DEFAULT_JANITOR_INTERVAL_SECS,
        )?;
        if janitor_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "TOKEN_JANITOR_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        Ok(Self {
            policy: SessionPolicy {
                max_devices,
                revoke_all_on_reuse,
            },
            brute_force: BruteForcePolicy {
                window,
                threshold,
            },
            janitor_interval: Duration::from_secs(janitor_secs),
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => {
            let parsed = raw.trim().parse();
            parsed.map_err(|_| ConfigError::Invalid { name, value: raw })
        }
    }
}
