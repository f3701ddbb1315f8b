use super::store::WindowStore;
use super::types::{RateLimitDecision, RateLimitPolicy, Window};
use crate::clock::Clock;
use crate::error::Result;
use crate::metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Fixed-window rate limiter over a shared [`WindowStore`].
///
/// A request straddling a window boundary may see up to twice the limit in
/// any rolling interval of one window length.
pub struct RateLimiter {
    store: Arc<WindowStore>,
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter over a store owned by the caller
    pub fn new(store: Arc<WindowStore>, policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    /// The process-wide policy
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Check and count one request for `identity` under the global policy
    pub fn admit(&self, identity: &str) -> Result<RateLimitDecision> {
        self.check(identity, &self.policy)
    }

    /// Check and count one request for `identity` under `policy`.
    ///
    /// Reset, comparison and increment happen under the identity's shard
    /// lock, so concurrent callers can never both take the last slot.
    pub fn check(&self, identity: &str, policy: &RateLimitPolicy) -> Result<RateLimitDecision> {
        let now = self.clock.now();
        let limit = policy.max_requests();

        let decision = self.store.update(
            identity,
            now,
            || Window::open(policy, now),
            |window| {
                if window.is_expired(now) {
                    *window = Window::open(policy, now);
                }

                if window.count < limit {
                    window.count += 1;
                    RateLimitDecision::allowed(limit, limit - window.count, window.reset_at)
                } else {
                    RateLimitDecision::denied(
                        limit,
                        window.reset_at,
                        retry_after_secs(now, window.reset_at),
                    )
                }
            },
        )?;

        trace!(
            identity = %identity,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Rate limit checked"
        );

        Ok(decision)
    }

    /// Remove expired windows, returning how many were dropped
    pub fn sweep(&self) -> usize {
        self.store.sweep_expired(self.clock.now())
    }

    /// Number of identities currently tracked
    pub fn tracked_identities(&self) -> usize {
        self.store.len()
    }
}

/// Whole seconds until `reset_at`, rounded up and never below one
fn retry_after_secs(now: DateTime<Utc>, reset_at: DateTime<Utc>) -> u64 {
    let millis = (reset_at - now).num_milliseconds().max(0);
    ((millis + 999) / 1000).max(1) as u64
}

/// Periodically sweep expired windows until the returned handle is aborted
pub fn spawn_window_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            let tracked = limiter.tracked_identities();
            metrics::record_window_store_size(tracked);
            if removed > 0 {
                debug!(removed, tracked, "Swept expired rate limit windows");
            }
        }
    })
}
