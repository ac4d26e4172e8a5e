//! Sliding-window rate limiting with escalation to a blacklist.
//!
//! The whole decision (blacklist check, prune, insert, count, violation
//! bookkeeping) is delegated to a single [`StateStore::admit`] call so it
//! cannot interleave with another request from the same identity.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::verdict::{AdmissionFailure, Denial, Verdict};
use crate::store::{StateStore, WindowOutcome, WindowPolicy};

const KEY_PREFIX: &str = "rate:";

pub struct RateLimiter {
    policy: WindowPolicy,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy: policy_from(config),
            store,
            clock,
        }
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    pub fn check(&self, identity: &str) -> Verdict {
        let key = store_key(identity);
        let now = self.clock.now_ms();

        match self.store.admit(&key, now, &self.policy) {
            WindowOutcome::Admitted { count } => {
                tracing::debug!(identity = %identity, count, limit = self.policy.limit, "Rate limit check passed");
                Verdict::Admitted
            }
            WindowOutcome::Blacklisted { until_ms } => {
                Denial::AdmissionDenied(AdmissionFailure::Blacklisted { until_ms }).into()
            }
            WindowOutcome::Exceeded {
                count,
                violations,
                blacklisted_until_ms,
            } => {
                if let Some(until_ms) = blacklisted_until_ms {
                    tracing::warn!(
                        identity = %identity,
                        block_secs = self.policy.block_ms / 1000,
                        until_ms,
                        "Identity blacklisted"
                    );
                    metrics::record_blacklisted();
                } else {
                    tracing::debug!(identity = %identity, violations, "Rate limit violation");
                }
                Denial::AdmissionDenied(AdmissionFailure::Exceeded {
                    count,
                    limit: self.policy.limit,
                })
                .into()
            }
        }
    }

    /// Blacklist an identity until `until_ms`.
    pub fn block(&self, identity: &str, until_ms: u64) {
        self.store.block(&store_key(identity), until_ms);
    }

    pub fn unblock(&self, identity: &str) -> bool {
        self.store.unblock(&store_key(identity))
    }

    pub fn blocked_until(&self, identity: &str) -> Option<u64> {
        self.store.blocked_until(&store_key(identity), self.clock.now_ms())
    }
}

pub fn policy_from(config: &RateLimitConfig) -> WindowPolicy {
    WindowPolicy {
        limit: config.limit,
        interval_ms: config.interval_secs.saturating_mul(1000),
        block_ms: config.block_time_secs.saturating_mul(1000),
        violation_threshold: config.violation_threshold,
        violation_decay_ms: config.violation_decay_secs.saturating_mul(1000),
    }
}

fn store_key(identity: &str) -> String {
    format!("{KEY_PREFIX}{identity}")
}
