//! Anonymity network (Tor exit relay) blocking.
//!
//! # Data Flow
//! ```text
//! ExitNodeRefresher (background task)
//!     → ExitListFetcher::fetch()   (HTTP GET with timeout)
//!     → parse_exit_list()
//!     → ExitNodeCache::replace()   (atomic swap of the whole set)
//!
//! AnonymityBlocker::check(identity)
//!     → ExitNodeCache::contains()  (lock-free read)
//! ```
//!
//! # Design Decisions
//! - Fail open: a failed refresh keeps the last good list; with no list at
//!   all nothing is blocked
//! - Failed refreshes retry with jittered exponential backoff, never slower
//!   than the regular interval

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use rand::Rng;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time;

use crate::clock::Clock;
use crate::config::AnonymityConfig;
use crate::observability::metrics;
use crate::security::identity::normalize_ip;
use crate::security::verdict::{Denial, Verdict};

const RETRY_BASE: Duration = Duration::from_secs(5);

/// Errors from one exit list refresh attempt.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("exit list fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("exit list transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("exit list source answered {0}")]
    Status(u16),

    #[error("exit list contained no addresses")]
    Empty,
}

/// Extract relay addresses from either the `ExitAddress <ip> <date>` record
/// format or a plain one-address-per-line list. Other lines are ignored.
pub fn parse_exit_list(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match fields.next()? {
                "ExitAddress" => normalize_ip(fields.next()?),
                single if fields.next().is_none() => normalize_ip(single),
                _ => None,
            }
        })
        .collect()
}

/// The current exit relay set, swapped wholesale on refresh.
#[derive(Debug, Default)]
pub struct ExitNodeCache {
    nodes: ArcSwap<HashSet<String>>,
    last_refresh_ms: AtomicU64,
}

impl ExitNodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.nodes.load().contains(identity)
    }

    pub fn replace(&self, nodes: HashSet<String>, now_ms: u64) {
        self.nodes.store(Arc::new(nodes));
        self.last_refresh_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.nodes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero until the first successful refresh.
    pub fn last_refresh_ms(&self) -> u64 {
        self.last_refresh_ms.load(Ordering::Relaxed)
    }
}

pub struct ExitListFetcher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl ExitListFetcher {
    pub fn new(config: &AnonymityConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.list_url.clone(),
            timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    pub async fn fetch(&self) -> Result<HashSet<String>, RefreshError> {
        let request = async {
            let response = self.client.get(&self.url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(RefreshError::Status(status.as_u16()));
            }
            Ok(response.text().await?)
        };

        let body = time::timeout(self.timeout, request)
            .await
            .map_err(|_| RefreshError::Timeout(self.timeout))??;

        let nodes = parse_exit_list(&body);
        if nodes.is_empty() {
            return Err(RefreshError::Empty);
        }
        Ok(nodes)
    }
}

/// Keeps an [`ExitNodeCache`] current.
pub struct ExitNodeRefresher {
    fetcher: ExitListFetcher,
    cache: Arc<ExitNodeCache>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ExitNodeRefresher {
    pub fn new(config: &AnonymityConfig, cache: Arc<ExitNodeCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher: ExitListFetcher::new(config),
            cache,
            clock,
            interval: Duration::from_secs(config.refresh_interval_secs),
        }
    }

    /// One refresh attempt. On failure the cache is left untouched.
    pub async fn refresh_once(&self) -> Result<usize, RefreshError> {
        match self.fetcher.fetch().await {
            Ok(nodes) => {
                let count = nodes.len();
                self.cache.replace(nodes, self.clock.now_ms());
                metrics::record_exit_list_refresh("success");
                metrics::record_exit_list_size(count);
                tracing::info!(relays = count, "Exit relay list refreshed");
                Ok(count)
            }
            Err(e) => {
                metrics::record_exit_list_refresh("failure");
                tracing::warn!(
                    error = %e,
                    cached = self.cache.len(),
                    "Exit relay list refresh failed, keeping previous list"
                );
                Err(e)
            }
        }
    }

    /// Refresh immediately, then on the configured interval until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            url = %self.fetcher.url,
            "Exit relay refresher starting"
        );

        let mut failures = 0u32;
        loop {
            let delay = match self.refresh_once().await {
                Ok(_) => {
                    failures = 0;
                    self.interval
                }
                Err(_) => {
                    failures = failures.saturating_add(1);
                    retry_delay(failures, self.interval)
                }
            };

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Exit relay refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Exponential delay with up to 10% jitter, capped at `ceiling`.
fn retry_delay(failures: u32, ceiling: Duration) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    let base = RETRY_BASE.saturating_mul(1u32 << exponent).min(ceiling);

    let jitter_range = base.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    (base + Duration::from_millis(jitter)).min(ceiling)
}

/// Rejects identities found in the exit relay set.
pub struct AnonymityBlocker {
    enabled: bool,
    cache: Arc<ExitNodeCache>,
}

impl AnonymityBlocker {
    pub fn new(config: &AnonymityConfig, cache: Arc<ExitNodeCache>) -> Self {
        Self {
            enabled: config.enabled,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ExitNodeCache> {
        &self.cache
    }

    pub fn check(&self, identity: &str) -> Verdict {
        if self.enabled && self.cache.contains(identity) {
            Denial::OriginRejected {
                identity: identity.to_string(),
            }
            .into()
        } else {
            Verdict::Admitted
        }
    }
}
