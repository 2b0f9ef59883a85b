//! PostgreSQL repositories, one per table.

pub mod login_attempt_repo;
pub mod refresh_token_repo;
pub mod security_audit_repo;
pub mod user_repo;

pub use login_attempt_repo::LoginAttemptRepo;
pub use refresh_token_repo::RefreshTokenRepo;
pub use security_audit_repo::SecurityAuditRepo;
pub use user_repo::UserRepo;
