//! Domain logic for the Haven session and token security subsystem.
//!
//! This crate has no internal dependencies so it can be shared by the
//! persistence layer, the API server, and any future CLI tooling.

pub mod brute_force;
pub mod error;
pub mod hashing;
pub mod roles;
pub mod security_events;
pub mod tokens;
pub mod types;
