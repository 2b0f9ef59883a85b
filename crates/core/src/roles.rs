//! Well-known role names.
//!
//! These must match the seed data in `20260301000001_create_roles_and_users.sql`.

pub const ROLE_MEMBER: &str = "member";
pub const ROLE_MODERATOR: &str = "moderator";
pub const ROLE_ADMIN: &str = "admin";
