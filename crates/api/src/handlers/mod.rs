//! Request handlers.
//!
//! Handlers translate HTTP requests into Session Manager calls and map
//! errors via [`AppError`](crate::error::AppError).

pub mod admin;
pub mod auth;
