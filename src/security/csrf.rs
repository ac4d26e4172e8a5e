//! Anti-forgery tokens.
//!
//! Two strategies:
//! - `Session`: a random token stored against the session with an expiry;
//!   state-changing requests must echo it back exactly.
//! - `Stateless`: `HMAC-SHA256(secret, unix_seconds)`; validation recomputes
//!   the candidates for the trailing window and compares in constant time.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::clock::Clock;
use crate::config::{CsrfConfig, CsrfStrategy};
use crate::security::request::GuardRequest;
use crate::security::verdict::{CsrfFailure, Denial, Verdict};
use crate::store::StateStore;

type HmacSha256 = Hmac<Sha256>;

const KEY_PREFIX: &str = "csrf:";
const TOKEN_BYTES: usize = 32;

/// Tokens a request carried, from the form body and from the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrfSubmission {
    pub form: Option<String>,
    pub header: Option<String>,
}

impl CsrfSubmission {
    pub fn from_request(request: &GuardRequest, config: &CsrfConfig) -> Self {
        Self {
            form: request.form_field(&config.form_field).filter(|t| !t.is_empty()),
            header: request
                .header(&config.header_name)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        }
    }

    pub fn header(token: impl Into<String>) -> Self {
        Self {
            form: None,
            header: Some(token.into()),
        }
    }

    pub fn form(token: impl Into<String>) -> Self {
        Self {
            form: Some(token.into()),
            header: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.form.is_none() && self.header.is_none()
    }

    fn candidates(&self) -> impl Iterator<Item = &str> {
        self.form.as_deref().into_iter().chain(self.header.as_deref())
    }
}

pub struct CsrfManager {
    config: CsrfConfig,
    secret: Vec<u8>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl CsrfManager {
    /// An empty configured secret is replaced by a random one, which is only
    /// valid for this process.
    pub fn new(config: CsrfConfig, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        let secret = if config.secret.is_empty() {
            random_bytes().to_vec()
        } else {
            config.secret.as_bytes().to_vec()
        };
        Self {
            config,
            secret,
            store,
            clock,
        }
    }

    pub fn strategy(&self) -> CsrfStrategy {
        self.config.strategy
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Issue a token for `session`, replacing any previous one. The stateless
    /// strategy ignores the session.
    pub fn issue(&self, session: &str) -> String {
        let now = self.clock.now_ms();
        match self.config.strategy {
            CsrfStrategy::Session => {
                let token = hex::encode(random_bytes());
                let expires = now.saturating_add(self.config.token_ttl_secs.saturating_mul(1000));
                self.store.put(&store_key(session), token.clone(), expires);
                tracing::debug!(session = %session, "Issued CSRF token");
                token
            }
            CsrfStrategy::Stateless => self
                .stateless_mac(now / 1000)
                .map(|mac| hex::encode(mac.finalize().into_bytes()))
                .unwrap_or_default(),
        }
    }

    /// The live session-bound token, if any.
    pub fn current(&self, session: &str) -> Option<String> {
        match self.config.strategy {
            CsrfStrategy::Session => self
                .store
                .get(&store_key(session), self.clock.now_ms())
                .map(|(token, _)| token),
            CsrfStrategy::Stateless => None,
        }
    }

    /// Validate a submission. Safe methods always pass. With `rotate`, a
    /// successfully used session token is replaced by a fresh one.
    pub fn validate(
        &self,
        session: Option<&str>,
        submitted: &CsrfSubmission,
        method: &str,
        rotate: bool,
    ) -> Verdict {
        if is_safe(method) {
            return Verdict::Admitted;
        }
        let result = match self.config.strategy {
            CsrfStrategy::Session => self.validate_session(session, submitted, rotate),
            CsrfStrategy::Stateless => self.validate_stateless(submitted),
        };
        match result {
            Ok(()) => Verdict::Admitted,
            Err(failure) => Denial::TokenRejected(failure).into(),
        }
    }

    fn validate_session(
        &self,
        session: Option<&str>,
        submitted: &CsrfSubmission,
        rotate: bool,
    ) -> Result<(), CsrfFailure> {
        let key = store_key(session.ok_or(CsrfFailure::Missing)?);
        let now = self.clock.now_ms();

        let (stored, _) = self.store.get(&key, now).ok_or(CsrfFailure::Missing)?;
        if submitted.is_empty() {
            return Err(CsrfFailure::Missing);
        }
        if !submitted.candidates().any(|t| constant_time_eq(t.as_bytes(), stored.as_bytes())) {
            return Err(CsrfFailure::Invalid);
        }

        if rotate {
            let fresh = hex::encode(random_bytes());
            let expires = now.saturating_add(self.config.token_ttl_secs.saturating_mul(1000));
            // Losing the race to a concurrent rotation is fine; the winner's token stands.
            self.store.compare_and_swap(&key, &stored, fresh, expires, now);
        }
        Ok(())
    }

    fn validate_stateless(&self, submitted: &CsrfSubmission) -> Result<(), CsrfFailure> {
        if submitted.is_empty() {
            return Err(CsrfFailure::Missing);
        }
        let now_secs = self.clock.now_ms() / 1000;
        let window = self.config.stateless_window_secs;

        for token in submitted.candidates() {
            let Ok(raw) = hex::decode(token) else {
                continue;
            };
            let matched = (0..window)
                .filter_map(|age| now_secs.checked_sub(age))
                .filter_map(|ts| self.stateless_mac(ts))
                .any(|mac| mac.verify_slice(&raw).is_ok());
            if matched {
                return Ok(());
            }
        }
        Err(CsrfFailure::Invalid)
    }

    /// HMAC takes keys of any length, so this is only `None` in theory.
    fn stateless_mac(&self, timestamp_secs: u64) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(timestamp_secs.to_string().as_bytes());
        Some(mac)
    }
}

fn is_safe(method: &str) -> bool {
    GuardRequest::new(method, "/").is_safe_method()
}

fn store_key(session: &str) -> String {
    format!("{KEY_PREFIX}{session}")
}

fn random_bytes() -> [u8; TOKEN_BYTES] {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::security::verdict::RejectionKind;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn manager(strategy: CsrfStrategy) -> (CsrfManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = CsrfConfig {
            strategy,
            secret: "an-adequately-long-test-secret".into(),
            ..CsrfConfig::default()
        };
        (CsrfManager::new(config, Arc::new(MemoryStore::new()), clock.clone()), clock)
    }

    fn failure(verdict: Verdict) -> Option<CsrfFailure> {
        match verdict {
            Verdict::Rejected(Denial::TokenRejected(f)) => Some(f),
            _ => None,
        }
    }

    #[test]
    fn test_safe_methods_bypass() {
        let (csrf, _) = manager(CsrfStrategy::Session);
        assert!(csrf.validate(None, &CsrfSubmission::default(), "GET", true).is_admitted());
        assert!(csrf.validate(None, &CsrfSubmission::default(), "head", true).is_admitted());
    }

    #[test]
    fn test_session_token_via_form_or_header() {
        let (csrf, _) = manager(CsrfStrategy::Session);
        let token = csrf.issue("s1");
        assert_eq!(token.len(), TOKEN_BYTES * 2);

        assert!(csrf.validate(Some("s1"), &CsrfSubmission::form(&token), "POST", false).is_admitted());
        assert!(csrf.validate(Some("s1"), &CsrfSubmission::header(&token), "DELETE", false).is_admitted());
    }

    #[test]
    fn test_session_token_rejections() {
        let (csrf, clock) = manager(CsrfStrategy::Session);

        // No token issued yet.
        let verdict = csrf.validate(Some("s1"), &CsrfSubmission::header("x"), "POST", false);
        assert_eq!(verdict.kind(), Some(RejectionKind::Forbidden));
        assert_eq!(failure(verdict), Some(CsrfFailure::Missing));

        let token = csrf.issue("s1");
        assert_eq!(
            failure(csrf.validate(Some("s1"), &CsrfSubmission::header("wrong"), "POST", false)),
            Some(CsrfFailure::Invalid)
        );
        assert_eq!(
            failure(csrf.validate(Some("s1"), &CsrfSubmission::default(), "PUT", false)),
            Some(CsrfFailure::Missing)
        );
        // Token bound to another session.
        assert_eq!(
            failure(csrf.validate(Some("s2"), &CsrfSubmission::header(&token), "POST", false)),
            Some(CsrfFailure::Missing)
        );
        assert_eq!(
            failure(csrf.validate(None, &CsrfSubmission::header(&token), "POST", false)),
            Some(CsrfFailure::Missing)
        );

        clock.advance(Duration::from_secs(3601));
        assert_eq!(
            failure(csrf.validate(Some("s1"), &CsrfSubmission::header(&token), "POST", false)),
            Some(CsrfFailure::Missing)
        );
    }

    #[test]
    fn test_one_token_per_session() {
        let (csrf, _) = manager(CsrfStrategy::Session);
        let first = csrf.issue("s1");
        let second = csrf.issue("s1");
        assert_ne!(first, second);
        assert!(!csrf.validate(Some("s1"), &CsrfSubmission::header(&first), "POST", false).is_admitted());
        assert!(csrf.validate(Some("s1"), &CsrfSubmission::header(&second), "POST", false).is_admitted());
    }

    #[test]
    fn test_rotation() {
        let (csrf, _) = manager(CsrfStrategy::Session);
        let token = csrf.issue("s1");

        assert!(csrf.validate(Some("s1"), &CsrfSubmission::header(&token), "POST", true).is_admitted());
        let rotated = csrf.current("s1").unwrap();
        assert_ne!(rotated, token);
        assert!(!csrf.validate(Some("s1"), &CsrfSubmission::header(&token), "POST", true).is_admitted());
        assert!(csrf.validate(Some("s1"), &CsrfSubmission::header(&rotated), "POST", false).is_admitted());
        assert_eq!(csrf.current("s1"), Some(rotated));
    }

    #[test]
    fn test_stateless_window() {
        let (csrf, clock) = manager(CsrfStrategy::Stateless);
        let token = csrf.issue("ignored");
        assert_eq!(csrf.current("ignored"), None);

        clock.advance(Duration::from_secs(299));
        assert!(csrf.validate(None, &CsrfSubmission::header(&token), "POST", true).is_admitted());

        clock.advance(Duration::from_secs(2));
        assert_eq!(
            failure(csrf.validate(None, &CsrfSubmission::header(&token), "POST", true)),
            Some(CsrfFailure::Invalid)
        );
    }

    #[test]
    fn test_stateless_rejects_foreign_secret() {
        let (csrf, _) = manager(CsrfStrategy::Stateless);
        let other = CsrfManager::new(
            CsrfConfig {
                strategy: CsrfStrategy::Stateless,
                secret: "a-completely-different-secret".into(),
                ..CsrfConfig::default()
            },
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
        );
        let forged = other.issue("");
        assert!(!csrf.validate(None, &CsrfSubmission::form(forged), "POST", false).is_admitted());
        assert!(!csrf.validate(None, &CsrfSubmission::form("not-hex"), "POST", false).is_admitted());
    }

    #[test]
    fn test_submission_from_request() {
        let config = CsrfConfig::default();
        let req = GuardRequest::new("POST", "/submit")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_header("X-CSRF-Token", "from-header")
            .with_body("csrf_token=from-form");
        assert_eq!(
            CsrfSubmission::from_request(&req, &config),
            CsrfSubmission {
                form: Some("from-form".into()),
                header: Some("from-header".into()),
            }
        );
    }
}
