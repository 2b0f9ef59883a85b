//! Periodic refresh-token cleanup.
//!
//! Each tick deletes rows past their expiry, then re-applies the device cap
//! to any user holding more active sessions than allowed. Transient store
//! errors are retried a few times with a growing delay; a tick that still
//! fails is logged and the loop carries on.

use std::future::Future;
use std::time::Duration;

use haven_core::error::AuthError;
use tokio_util::sync::CancellationToken;

use crate::auth::context::RequestContext;
use crate::auth::session::SessionManager;

/// Attempts per step before giving up until the next tick.
const MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubled for each further retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Totals from one janitor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub purged: u64,
    pub evicted: usize,
}

/// Run the janitor loop until `cancel` is triggered.
pub async fn run(sessions: SessionManager, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        max_devices = sessions.policy().max_devices,
        "Token janitor started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Token janitor stopping");
                break;
            }
            _ = ticker.tick() => {
                let report = sweep(&sessions, &cancel).await;
                if report.purged > 0 || report.evicted > 0 {
                    tracing::info!(
                        purged = report.purged,
                        evicted = report.evicted,
                        "Token janitor: sweep complete"
                    );
                } else {
                    tracing::debug!("Token janitor: nothing to do");
                }
            }
        }
    }
}

/// One pass: purge expired rows, then enforce device caps.
pub async fn sweep(sessions: &SessionManager, cancel: &CancellationToken) -> SweepReport {
    let ctx = RequestContext::system();
    let mut report = SweepReport::default();

    match with_retry("purge_expired", cancel, || sessions.purge_expired()).await {
        Ok(purged) => report.purged = purged,
        Err(e) => tracing::error!(error = %e, "Token janitor: purge failed"),
    }

    match with_retry("enforce_device_caps", cancel, || sessions.enforce_device_caps(&ctx)).await {
        Ok(evicted) => report.evicted = evicted,
        Err(e) => tracing::error!(error = %e, "Token janitor: device cap enforcement failed"),
    }

    report
}

async fn with_retry<T, F, Fut>(
    step: &'static str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AuthError>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(step, attempt, error = %e, "Token janitor: retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(e),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
