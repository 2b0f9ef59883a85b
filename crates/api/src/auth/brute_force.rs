//! Windowed failed-login counting over the login attempt history.

use std::sync::Arc;

use chrono::Utc;
use haven_core::brute_force::{BruteForceCheck, BruteForcePolicy};
use haven_db::models::login_attempt::{CreateLoginAttempt, LoginAttempt};
use haven_db::store::LoginAttemptStore;
use haven_db::StoreResult;

use super::context::RequestContext;

/// Counts recent failures per identity/address pair.
///
/// Read-only apart from [`BruteForceDetector::record_attempt`], which the
/// login flow calls once per attempt. Blocking is the caller's decision.
#[derive(Clone)]
pub struct BruteForceDetector {
    attempts: Arc<dyn LoginAttemptStore>,
    policy: BruteForcePolicy,
}

impl BruteForceDetector {
    pub fn new(attempts: Arc<dyn LoginAttemptStore>, policy: BruteForcePolicy) -> Self {
        Self { attempts, policy }
    }

    pub fn policy(&self) -> BruteForcePolicy {
        self.policy
    }

    /// Check `identity` and `address` against the configured policy.
    pub async fn check(&self, identity: &str, address: Option<&str>) -> StoreResult<BruteForceCheck> {
        self.check_with_policy(identity, address, self.policy).await
    }

    /// Count failures matching `identity` OR `address` within the policy window.
    pub async fn check_with_policy(
        &self,
        identity: &str,
        address: Option<&str>,
        policy: BruteForcePolicy,
    ) -> StoreResult<BruteForceCheck> {
        let since = policy.window_start(Utc::now());
        let count = self
            .attempts
            .count_failures_since(identity, address, since)
            .await?;
        Ok(policy.evaluate(count))
    }

    /// Append one login attempt.
    pub async fn record_attempt(
        &self,
        identity: &str,
        success: bool,
        failure_reason: Option<&str>,
        ctx: &RequestContext,
    ) -> StoreResult<LoginAttempt> {
        self.attempts
            .record(CreateLoginAttempt {
                email: identity.to_string(),
                ip_address: ctx.ip_address.clone(),
                success,
                failure_reason: failure_reason.map(str::to_string),
                user_agent: ctx.user_agent.clone(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use haven_core::brute_force::failure_reasons;
    use haven_db::memory::MemoryLoginAttemptStore;

    const EMAIL: &str = "sam@example.com";

    fn failure(email: &str, ip: &str) -> CreateLoginAttempt {
        CreateLoginAttempt {
            email: email.to_string(),
            ip_address: Some(ip.to_string()),
            success: false,
            failure_reason: Some(failure_reasons::INVALID_PASSWORD.into()),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn five_failures_in_window_trip_the_detector() {
        let store = Arc::new(MemoryLoginAttemptStore::new());
        let detector = BruteForceDetector::new(store.clone(), BruteForcePolicy::default());
        let now = Utc::now();

        for i in 0..5 {
            store.record_at(failure(EMAIL, "198.51.100.1"), now - Duration::minutes(i));
        }
        // Outside the 15 minute window.
        store.record_at(failure(EMAIL, "198.51.100.1"), now - Duration::minutes(20));

        let check = detector.check(EMAIL, None).await.unwrap();
        assert!(check.is_over);
        assert_eq!(check.count, 5);
        assert_eq!(check.remaining, 0);
    }

    #[tokio::test]
    async fn successes_do_not_count() {
        let store = Arc::new(MemoryLoginAttemptStore::new());
        let detector = BruteForceDetector::new(store.clone(), BruteForcePolicy::default());
        let ctx = RequestContext::default().with_ip("198.51.100.2");

        detector.record_attempt(EMAIL, true, None, &ctx).await.unwrap();
        detector
            .record_attempt(EMAIL, false, Some(failure_reasons::UNKNOWN_USER), &ctx)
            .await
            .unwrap();

        let check = detector.check(EMAIL, Some("198.51.100.2")).await.unwrap();
        assert_eq!(check.count, 1);
        assert_eq!(check.remaining, 4);
        assert!(!check.is_over);
    }

    #[tokio::test]
    async fn address_matches_across_identities() {
        let store = Arc::new(MemoryLoginAttemptStore::new());
        let detector = BruteForceDetector::new(store.clone(), BruteForcePolicy::default());
        let now = Utc::now();
        for i in 0..3 {
            store.record_at(failure(&format!("user{i}@example.com"), "192.0.2.9"), now);
        }

        let check = detector.check(EMAIL, Some("192.0.2.9")).await.unwrap();
        assert_eq!(check.count, 3);
    }

    #[tokio::test]
    async fn custom_policy_overrides_defaults() {
        let store = Arc::new(MemoryLoginAttemptStore::new());
        let detector = BruteForceDetector::new(store.clone(), BruteForcePolicy::default());
        store.record_at(failure(EMAIL, "192.0.2.1"), Utc::now() - Duration::minutes(3));
        store.record_at(failure(EMAIL, "192.0.2.1"), Utc::now());

        let strict = BruteForcePolicy {
            window: Duration::minutes(1),
            threshold: 1,
        };
        let check = detector.check_with_policy(EMAIL, None, strict).await.unwrap();
        assert_eq!(check.count, 1);
        assert!(check.is_over);
    }
}
