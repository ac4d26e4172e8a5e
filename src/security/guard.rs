//! The guard orchestrator.
//!
//! # Data Flow
//! ```text
//! run_pipeline(request, session)
//!     → resolve_identity
//!     → check_rate_limit   (TooManyRequests / Blocked)
//!     → check_anonymity    (Forbidden)
//!     → check_signatures   (Blocked)
//!     → validate_csrf      (Forbidden, no rotation)
//!     → check_honeypot     (NotFound)
//!     → Admitted
//! ```
//!
//! # Design Decisions
//! - Stages decide, the orchestrator records: every rejection is appended
//!   to the attack log and counted before it is returned
//! - The first rejection ends evaluation
//! - Each stage is also callable on its own, with the same logging
//! - Configuration is owned by value; all mutable state lives behind the
//!   shared [`StateStore`] and [`ExitNodeCache`], so a reloaded guard can be
//!   built over the same state

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::{validate_guard, ConfigError, GuardConfig, ValidationError};
use crate::observability::metrics;
use crate::security::anonymity::{AnonymityBlocker, ExitNodeCache};
use crate::security::attack_log::{AttackLog, AttackLogEntry};
use crate::security::csrf::{CsrfManager, CsrfSubmission};
use crate::security::honeypot::Honeypot;
use crate::security::identity::{normalize_ip, IdentityResolver};
use crate::security::rate_limit::RateLimiter;
use crate::security::request::GuardRequest;
use crate::security::signatures::{SignatureFilter, SignatureSet};
use crate::security::verdict::{AttackCategory, Verdict};
use crate::store::StateStore;

/// The guard as shared with request handlers; swapped on config reload.
pub type SharedGuard = Arc<ArcSwap<Guard>>;

/// Snapshot returned by [`Guard::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardStats {
    pub tracked_identities: usize,
    pub blacklisted: usize,
    pub window_requests: usize,
    pub attack_log_entries: usize,
    pub exit_nodes: usize,
    pub exit_list_refreshed_ms: u64,
    pub limit: usize,
    pub interval_secs: u64,
    pub block_time_secs: u64,
}

pub struct Guard {
    config: GuardConfig,
    identity: IdentityResolver,
    rate_limiter: RateLimiter,
    anonymity: AnonymityBlocker,
    signatures: SignatureFilter,
    csrf: CsrfManager,
    honeypot: Honeypot,
    attack_log: AttackLog,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl Guard {
    /// Build a guard on the system clock with an empty exit relay cache.
    pub fn new(config: GuardConfig, store: Arc<dyn StateStore>) -> Result<Self, ConfigError> {
        Self::with_parts(config, store, Arc::new(SystemClock), Arc::new(ExitNodeCache::new()))
    }

    pub fn with_parts(
        config: GuardConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        exit_nodes: Arc<ExitNodeCache>,
    ) -> Result<Self, ConfigError> {
        validate_guard(&config).map_err(ConfigError::Validation)?;

        let set = SignatureSet::from_config(&config.waf.signatures).map_err(|(id, e)| {
            ConfigError::Validation(vec![ValidationError::Pattern {
                id,
                reason: e.to_string(),
            }])
        })?;

        tracing::debug!(
            limit = config.rate_limit.limit,
            interval_secs = config.rate_limit.interval_secs,
            signatures = set.len(),
            csrf = ?config.csrf.strategy,
            "Guard constructed"
        );

        Ok(Self {
            identity: IdentityResolver::new(config.identity.trusted_proxies),
            rate_limiter: RateLimiter::new(&config.rate_limit, store.clone(), clock.clone()),
            anonymity: AnonymityBlocker::new(&config.anonymity, exit_nodes),
            signatures: SignatureFilter::new(set),
            csrf: CsrfManager::new(config.csrf.clone(), store.clone(), clock.clone()),
            honeypot: Honeypot::new(&config.honeypot),
            attack_log: AttackLog::new(&config.attack_log, store.clone(), clock.clone()),
            config,
            store,
            clock,
        })
    }

    /// A guard with new configuration over this guard's store, clock and
    /// exit relay cache, so counters and blacklists carry over.
    pub fn reconfigure(&self, config: GuardConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, self.store.clone(), self.clock.clone(), self.anonymity.cache().clone())
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn exit_nodes(&self) -> &Arc<ExitNodeCache> {
        self.anonymity.cache()
    }

    /// The token manager, for callers that validate tokens outside a request.
    pub fn csrf(&self) -> &CsrfManager {
        &self.csrf
    }

    pub fn resolve_identity(&self, request: &GuardRequest) -> String {
        self.identity.resolve(request)
    }

    pub fn check_rate_limit(&self, identity: &str, request: &GuardRequest) -> Verdict {
        if !self.config.rate_limit.enabled {
            return Verdict::Admitted;
        }
        let verdict = self.rate_limiter.check(identity);
        self.settle("rate_limit", identity, request, verdict)
    }

    pub fn check_anonymity(&self, identity: &str, request: &GuardRequest) -> Verdict {
        let verdict = self.anonymity.check(identity);
        self.settle("anonymity", identity, request, verdict)
    }

    pub fn check_signatures(&self, identity: &str, request: &GuardRequest) -> Verdict {
        if !self.config.waf.enabled {
            return Verdict::Admitted;
        }
        let verdict = self.signatures.check(request);
        self.settle("waf", identity, request, verdict)
    }

    pub fn issue_csrf_token(&self, session: &str) -> String {
        self.csrf.issue(session)
    }

    /// The live token for `session`, if the session strategy holds one.
    pub fn csrf_token(&self, session: &str) -> Option<String> {
        self.csrf.current(session)
    }

    /// Check the token carried by `request` (form field or header).
    pub fn validate_csrf(
        &self,
        identity: &str,
        session: Option<&str>,
        request: &GuardRequest,
        rotate: bool,
    ) -> Verdict {
        if !self.config.csrf.enabled {
            return Verdict::Admitted;
        }
        let submitted = CsrfSubmission::from_request(request, self.csrf.config());
        let verdict = self.csrf.validate(session, &submitted, &request.method, rotate);
        self.settle("csrf", identity, request, verdict)
    }

    pub fn check_honeypot(&self, identity: &str, request: &GuardRequest) -> Verdict {
        let verdict = self.honeypot.check(&request.path);
        self.settle("honeypot", identity, request, verdict)
    }

    /// Every stage in order; the first rejection wins. The session token is
    /// not rotated so the handler behind the guard can still see it.
    pub fn run_pipeline(&self, request: &GuardRequest, session: Option<&str>) -> Verdict {
        let identity = self.resolve_identity(request);

        let stages: [&dyn Fn() -> Verdict; 5] = [
            &|| self.check_rate_limit(&identity, request),
            &|| self.check_anonymity(&identity, request),
            &|| self.check_signatures(&identity, request),
            &|| self.validate_csrf(&identity, session, request, false),
            &|| self.check_honeypot(&identity, request),
        ];
        for stage in stages {
            let verdict = stage();
            if !verdict.is_admitted() {
                return verdict;
            }
        }

        tracing::debug!(identity = %identity, path = %request.path, "Request admitted");
        metrics::record_verdict("pipeline", &Verdict::Admitted);
        Verdict::Admitted
    }

    pub fn record_attack(
        &self,
        identity: &str,
        category: AttackCategory,
        detail: &str,
        request: &GuardRequest,
    ) -> AttackLogEntry {
        self.attack_log
            .record(identity, category, detail, &request.path, request.user_agent())
    }

    pub fn list_attacks(&self) -> Vec<AttackLogEntry> {
        self.attack_log.list()
    }

    /// Blacklist an identity for `duration`. Returns the expiry.
    pub fn block_identity(&self, identity: &str, duration: Duration) -> u64 {
        let identity = canonical(identity);
        let until = self.clock.now_ms().saturating_add(duration.as_millis() as u64);
        self.rate_limiter.block(&identity, until);
        metrics::record_blacklisted();
        tracing::warn!(identity = %identity, until_ms = until, "Identity blacklisted manually");
        until
    }

    /// Lift a blacklist entry. Returns whether one was active.
    pub fn unblock_identity(&self, identity: &str) -> bool {
        let identity = canonical(identity);
        let removed = self.rate_limiter.unblock(&identity);
        if removed {
            tracing::info!(identity = %identity, "Identity unblocked");
        }
        removed
    }

    pub fn blocked_until(&self, identity: &str) -> Option<u64> {
        self.rate_limiter.blocked_until(&canonical(identity))
    }

    pub fn stats(&self) -> GuardStats {
        let store = self.store.stats(self.clock.now_ms());
        let exit_nodes = self.anonymity.cache();
        GuardStats {
            tracked_identities: store.tracked_identities,
            blacklisted: store.blacklisted,
            window_requests: store.window_requests,
            attack_log_entries: self.attack_log.list().len(),
            exit_nodes: exit_nodes.len(),
            exit_list_refreshed_ms: exit_nodes.last_refresh_ms(),
            limit: self.config.rate_limit.limit,
            interval_secs: self.config.rate_limit.interval_secs,
            block_time_secs: self.config.rate_limit.block_time_secs,
        }
    }

    /// Forget expired state. Returns how many identities were dropped.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(
            self.clock.now_ms(),
            self.rate_limiter.policy(),
            self.attack_log.retention(),
        )
    }

    fn settle(&self, stage: &'static str, identity: &str, request: &GuardRequest, verdict: Verdict) -> Verdict {
        metrics::record_verdict(stage, &verdict);
        match verdict.denial() {
            Some(denial) => {
                self.record_attack(identity, denial.category(), &denial.to_string(), request);
            }
            None => tracing::debug!(stage, identity = %identity, "Stage passed"),
        }
        verdict
    }
}

fn canonical(identity: &str) -> String {
    normalize_ip(identity).unwrap_or_else(|| identity.trim().to_string())
}
