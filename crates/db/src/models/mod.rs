pub mod login_attempt;
pub mod refresh_token;
pub mod security_audit;
pub mod user;
