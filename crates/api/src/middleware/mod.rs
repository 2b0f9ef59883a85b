//! Request extractors.
//!
//! - [`request_context::ClientContext`] -- client address, user agent and route of a request.
//! - [`auth::AuthUser`] -- the user behind a verified Bearer access token.
//! - [`rbac::RequireAdmin`] -- requires the `admin` role; denials are audited.

pub mod auth;
pub mod rbac;
pub mod request_context;
