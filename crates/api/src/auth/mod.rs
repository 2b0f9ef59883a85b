//! Authentication and session security primitives.
//!
//! - [`jwt`] -- signing secrets and the access/refresh token codec.
//! - [`session`] -- issuance, rotation, revocation and cleanup of refresh tokens.
//! - [`verifier`] -- per-request access token verification.
//! - [`brute_force`] -- windowed failed-login counting.
//! - [`audit`] -- best-effort security audit logging.
//! - [`context`] -- client metadata attached to audit events and sessions.
//! - [`password`] -- Argon2id password verification for the login flow.

pub mod audit;
pub mod brute_force;
pub mod context;
pub mod jwt;
pub mod password;
pub mod session;
pub mod verifier;
