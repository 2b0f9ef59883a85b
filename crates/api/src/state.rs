use std::sync::Arc;

use haven_db::memory::{
    MemoryAuditStore, MemoryCredentialStore, MemoryIdentityStore, MemoryLoginAttemptStore,
};
use haven_db::pg::{PgAuditStore, PgCredentialStore, PgIdentityStore, PgLoginAttemptStore};
use haven_db::store::{AuditStore, CredentialStore, IdentityStore, LoginAttemptStore};
use haven_db::DbPool;

use crate::auth::audit::AuditLogger;
use crate::auth::brute_force::BruteForceDetector;
use crate::auth::jwt::TokenCodec;
use crate::auth::session::SessionManager;
use crate::auth::verifier::AccessVerifier;
use crate::config::ServerConfig;

/// The storage backends the subsystem runs against.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub login_attempts: Arc<dyn LoginAttemptStore>,
    pub audit: Arc<dyn AuditStore>,
    pub identity: Arc<dyn IdentityStore>,
    /// Present when backed by PostgreSQL; used by the health check.
    pub pool: Option<DbPool>,
}

impl Stores {
    /// PostgreSQL-backed stores sharing one pool.
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            credentials: Arc::new(PgCredentialStore::new(pool.clone())),
            login_attempts: Arc::new(PgLoginAttemptStore::new(pool.clone())),
            audit: Arc::new(PgAuditStore::new(pool.clone())),
            identity: Arc::new(PgIdentityStore::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// In-memory stores. Returned alongside the concrete handles so callers
    /// can seed users and inspect rows.
    pub fn memory() -> (Self, MemoryHandles) {
        let handles = MemoryHandles::default();
        let stores = Self {
            credentials: handles.credentials.clone(),
            login_attempts: handles.login_attempts.clone(),
            audit: handles.audit.clone(),
            identity: handles.identity.clone(),
            pool: None,
        };
        (stores, handles)
    }
}

/// Concrete handles to the in-memory stores behind [`Stores::memory`].
#[derive(Clone, Default)]
pub struct MemoryHandles {
    pub credentials: Arc<MemoryCredentialStore>,
    pub login_attempts: Arc<MemoryLoginAttemptStore>,
    pub audit: Arc<MemoryAuditStore>,
    pub identity: Arc<MemoryIdentityStore>,
}

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: SessionManager,
    pub verifier: AccessVerifier,
    pub brute_force: BruteForceDetector,
    pub identity: Arc<dyn IdentityStore>,
    pub audit: AuditLogger,
    pub pool: Option<DbPool>,
}

impl AppState {
    /// Wire the session subsystem over the given stores.
    pub fn new(config: ServerConfig, stores: Stores) -> Self {
        let codec = Arc::new(TokenCodec::new(&config.jwt));
        let audit = AuditLogger::new(stores.audit);

        let sessions = SessionManager::new(
            Arc::clone(&codec),
            stores.credentials,
            Arc::clone(&stores.identity),
            audit.clone(),
            config.session.policy,
        );
        let verifier = AccessVerifier::new(codec, Arc::clone(&stores.identity), audit.clone());
        let brute_force =
            BruteForceDetector::new(stores.login_attempts, config.session.brute_force);

        Self {
            config: Arc::new(config),
            sessions,
            verifier,
            brute_force,
            identity: stores.identity,
            audit,
            pool: stores.pool,
        }
    }
}
