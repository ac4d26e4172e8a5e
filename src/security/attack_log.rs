//! Shared log of rejected requests.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::AttackLogConfig;
use crate::observability::metrics;
use crate::security::verdict::AttackCategory;
use crate::store::{Retention, StateStore};

const LOG_KEY: &str = "attack_logs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackLogEntry {
    pub identity: String,
    pub category: AttackCategory,
    pub detail: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub user_agent: String,
}

pub struct AttackLog {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    retention: Retention,
}

impl AttackLog {
    pub fn new(config: &AttackLogConfig, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retention: Retention {
                ttl_ms: Duration::from_secs(config.retention_secs).as_millis() as u64,
                max_entries: config.max_entries,
            },
        }
    }

    pub fn retention(&self) -> &Retention {
        &self.retention
    }

    /// Append an entry stamped with the current time.
    pub fn record(
        &self,
        identity: &str,
        category: AttackCategory,
        detail: &str,
        path: &str,
        user_agent: &str,
    ) -> AttackLogEntry {
        let now = self.clock.now_ms();
        let entry = AttackLogEntry {
            identity: identity.to_string(),
            category,
            detail: detail.to_string(),
            timestamp_ms: now,
            path: path.to_string(),
            user_agent: user_agent.to_string(),
        };

        match serde_json::to_string(&entry) {
            Ok(line) => self.store.append(LOG_KEY, line, now, &self.retention),
            Err(e) => tracing::error!(error = %e, "Failed to serialize attack log entry"),
        }
        tracing::warn!(
            identity = %identity,
            category = %category,
            detail = %detail,
            path = %path,
            "Attack detected"
        );
        entry
    }

    /// Live entries, oldest first.
    pub fn list(&self) -> Vec<AttackLogEntry> {
        let lines = self.store.entries(LOG_KEY, self.clock.now_ms(), &self.retention);
        metrics::record_attack_log_size(lines.len());
        lines
            .iter()
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable attack log entry");
                    None
                }
            })
            .collect()
    }
}
