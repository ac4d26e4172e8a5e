//! In-process state store.
//!
//! `DashMap` entry guards hold the shard lock for the whole of each compound
//! operation, which serializes concurrent requests for the same key.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use dashmap::DashMap;
use thiserror::Error;

use super::{Retention, StateStore, StoreStats, WindowOutcome, WindowPolicy};

/// Errors from blacklist snapshot persistence.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct ClientRecord {
    window: VecDeque<u64>,
    violations: u32,
    last_violation_ms: u64,
    blocked_until_ms: Option<u64>,
}

impl ClientRecord {
    fn prune(&mut self, now_ms: u64, interval_ms: u64) {
        if let Some(horizon) = now_ms.checked_sub(interval_ms) {
            while self.window.front().is_some_and(|&t| t <= horizon) {
                self.window.pop_front();
            }
        }
    }

    fn is_blocked(&self, now_ms: u64) -> bool {
        self.blocked_until_ms.is_some_and(|until| now_ms < until)
    }

    fn violations_live(&self, now_ms: u64, decay_ms: u64) -> bool {
        self.violations > 0
            && (decay_ms == 0 || now_ms.saturating_sub(self.last_violation_ms) <= decay_ms)
    }
}

#[derive(Debug, Clone)]
struct TtlValue {
    value: String,
    expires_at_ms: u64,
}

impl TtlValue {
    fn is_live(&self, now_ms: u64) -> bool {
        now_ms <= self.expires_at_ms
    }
}

fn prune_log(log: &mut VecDeque<(u64, String)>, now_ms: u64, retention: &Retention) {
    if let Some(horizon) = now_ms.checked_sub(retention.ttl_ms) {
        while log.front().is_some_and(|(t, _)| *t <= horizon) {
            log.pop_front();
        }
    }
    while log.len() > retention.max_entries {
        log.pop_front();
    }
}

/// A thread-safe, single-process [`StateStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    clients: DashMap<String, ClientRecord>,
    values: DashMap<String, TtlValue>,
    logs: DashMap<String, VecDeque<(u64, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write active blacklist entries to `path` as JSON.
    pub fn save_snapshot(&self, path: &Path, now_ms: u64) -> Result<usize, SnapshotError> {
        let blocked: HashMap<String, u64> = self
            .clients
            .iter()
            .filter(|r| r.value().is_blocked(now_ms))
            .filter_map(|r| r.value().blocked_until_ms.map(|until| (r.key().clone(), until)))
            .collect();

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &blocked)?;
        tracing::info!(entries = blocked.len(), path = ?path, "Saved blacklist snapshot");
        Ok(blocked.len())
    }

    /// Restore blacklist entries from `path`, skipping ones already expired.
    /// A missing file restores nothing.
    pub fn load_snapshot(&self, path: &Path, now_ms: u64) -> Result<usize, SnapshotError> {
        if !path.exists() {
            return Ok(0);
        }
        let reader = BufReader::new(File::open(path)?);
        let blocked: HashMap<String, u64> = serde_json::from_reader(reader)?;

        let mut restored = 0;
        for (key, until) in blocked {
            if until > now_ms {
                self.block(&key, until);
                restored += 1;
            }
        }
        tracing::info!(entries = restored, path = ?path, "Loaded blacklist snapshot");
        Ok(restored)
    }
}

impl StateStore for MemoryStore {
    fn admit(&self, key: &str, now_ms: u64, policy: &WindowPolicy) -> WindowOutcome {
        let mut record = self.clients.entry(key.to_string()).or_default();

        if let Some(until_ms) = record.blocked_until_ms {
            if now_ms < until_ms {
                return WindowOutcome::Blacklisted { until_ms };
            }
            record.blocked_until_ms = None;
        }

        record.prune(now_ms, policy.interval_ms);
        record.window.push_back(now_ms);
        // Rejected requests keep the window saturated without growing it.
        while record.window.len() > policy.limit + 1 {
            record.window.pop_front();
        }
        let count = record.window.len();

        if count <= policy.limit {
            return WindowOutcome::Admitted { count };
        }

        if !record.violations_live(now_ms, policy.violation_decay_ms) {
            record.violations = 0;
        }
        record.violations += 1;
        record.last_violation_ms = now_ms;
        let violations = record.violations;

        let blacklisted_until_ms = if violations >= policy.violation_threshold {
            let until = now_ms.saturating_add(policy.block_ms);
            record.blocked_until_ms = Some(until);
            record.violations = 0;
            record.window.clear();
            Some(until)
        } else {
            None
        };

        WindowOutcome::Exceeded {
            count,
            violations,
            blacklisted_until_ms,
        }
    }

    fn block(&self, key: &str, until_ms: u64) {
        let mut record = self.clients.entry(key.to_string()).or_default();
        record.blocked_until_ms = Some(until_ms);
        record.violations = 0;
        record.window.clear();
    }

    fn unblock(&self, key: &str) -> bool {
        match self.clients.get_mut(key) {
            Some(mut record) => {
                record.violations = 0;
                record.blocked_until_ms.take().is_some()
            }
            None => false,
        }
    }

    fn blocked_until(&self, key: &str, now_ms: u64) -> Option<u64> {
        self.clients
            .get(key)
            .and_then(|r| r.blocked_until_ms)
            .filter(|&until| now_ms < until)
    }

    fn put(&self, key: &str, value: String, expires_at_ms: u64) {
        self.values.insert(
            key.to_string(),
            TtlValue {
                value,
                expires_at_ms,
            },
        );
    }

    fn get(&self, key: &str, now_ms: u64) -> Option<(String, u64)> {
        let live = self
            .values
            .get(key)
            .map(|v| v.is_live(now_ms).then(|| (v.value.clone(), v.expires_at_ms)));

        match live {
            Some(Some(found)) => Some(found),
            Some(None) => {
                self.values.remove_if(key, |_, v| !v.is_live(now_ms));
                None
            }
            None => None,
        }
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        value: String,
        expires_at_ms: u64,
        now_ms: u64,
    ) -> bool {
        match self.values.get_mut(key) {
            Some(mut current) if current.is_live(now_ms) && current.value == expected => {
                *current = TtlValue {
                    value,
                    expires_at_ms,
                };
                true
            }
            _ => false,
        }
    }

    fn remove(&self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    fn append(&self, key: &str, entry: String, now_ms: u64, retention: &Retention) {
        let mut log = self.logs.entry(key.to_string()).or_default();
        log.push_back((now_ms, entry));
        prune_log(&mut log, now_ms, retention);
    }

    fn entries(&self, key: &str, now_ms: u64, retention: &Retention) -> Vec<String> {
        let Some(log) = self.logs.get(key) else {
            return Vec::new();
        };
        let horizon = now_ms.checked_sub(retention.ttl_ms);
        let live: Vec<&String> = log
            .iter()
            .filter(|(t, _)| horizon.map_or(true, |h| *t > h))
            .map(|(_, e)| e)
            .collect();
        let skip = live.len().saturating_sub(retention.max_entries);
        live.into_iter().skip(skip).cloned().collect()
    }

    fn purge_expired(&self, now_ms: u64, policy: &WindowPolicy, retention: &Retention) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, record| {
            record.prune(now_ms, policy.interval_ms);
            if record.blocked_until_ms.is_some_and(|until| now_ms >= until) {
                record.blocked_until_ms = None;
            }
            record.blocked_until_ms.is_some()
                || !record.window.is_empty()
                || record.violations_live(now_ms, policy.violation_decay_ms)
        });
        let forgotten = before.saturating_sub(self.clients.len());

        self.values.retain(|_, v| v.is_live(now_ms));
        self.logs.retain(|_, log| {
            prune_log(log, now_ms, retention);
            !log.is_empty()
        });

        forgotten
    }

    fn stats(&self, now_ms: u64) -> StoreStats {
        let mut stats = StoreStats::default();
        for record in self.clients.iter() {
            stats.tracked_identities += 1;
            if record.is_blocked(now_ms) {
                stats.blacklisted += 1;
            }
            stats.window_requests += record.window.len();
        }
        stats.ttl_entries = self.values.iter().filter(|v| v.is_live(now_ms)).count();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: WindowPolicy = WindowPolicy {
        limit: 3,
        interval_ms: 10_000,
        block_ms: 60_000,
        violation_threshold: 3,
        violation_decay_ms: 0,
    };

    const RETENTION: Retention = Retention {
        ttl_ms: 1_000,
        max_entries: 3,
    };

    #[test]
    fn test_window_admits_up_to_limit() {
        let store = MemoryStore::new();
        for i in 1..=3 {
            assert_eq!(store.admit("a", 100, &POLICY), WindowOutcome::Admitted { count: i });
        }
        assert!(matches!(
            store.admit("a", 100, &POLICY),
            WindowOutcome::Exceeded { count: 4, violations: 1, blacklisted_until_ms: None }
        ));
        // Independent identity.
        assert_eq!(store.admit("b", 100, &POLICY), WindowOutcome::Admitted { count: 1 });
    }

    #[test]
    fn test_window_slides() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store.admit("a", 1_000, &POLICY);
        }
        // Exactly one interval later the old entries are gone.
        assert_eq!(store.admit("a", 11_000, &POLICY), WindowOutcome::Admitted { count: 1 });
    }

    #[test]
    fn test_early_timestamps_are_not_pruned() {
        let store = MemoryStore::new();
        store.admit("a", 0, &POLICY);
        assert_eq!(store.admit("a", 5, &POLICY), WindowOutcome::Admitted { count: 2 });
    }

    #[test]
    fn test_third_breach_blacklists() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store.admit("a", 100, &POLICY);
        }
        store.admit("a", 100, &POLICY);
        store.admit("a", 100, &POLICY);
        assert_eq!(
            store.admit("a", 100, &POLICY),
            WindowOutcome::Exceeded {
                count: 4,
                violations: 3,
                blacklisted_until_ms: Some(60_100),
            }
        );
        assert_eq!(
            store.admit("a", 200, &POLICY),
            WindowOutcome::Blacklisted { until_ms: 60_100 }
        );
        assert_eq!(store.blocked_until("a", 200), Some(60_100));

        // Fresh window and counter after expiry.
        assert_eq!(store.admit("a", 60_100, &POLICY), WindowOutcome::Admitted { count: 1 });
        assert_eq!(store.blocked_until("a", 60_100), None);
    }

    #[test]
    fn test_violation_decay() {
        let policy = WindowPolicy {
            violation_decay_ms: 5_000,
            ..POLICY
        };
        let store = MemoryStore::new();
        for _ in 0..4 {
            store.admit("a", 0, &policy);
        }
        // Window still full, but the previous breach is too old to count.
        assert!(matches!(
            store.admit("a", 9_000, &policy),
            WindowOutcome::Exceeded { violations: 1, .. }
        ));
    }

    #[test]
    fn test_manual_block_and_unblock() {
        let store = MemoryStore::new();
        store.block("a", 5_000);
        assert!(matches!(store.admit("a", 1, &POLICY), WindowOutcome::Blacklisted { .. }));
        assert!(store.unblock("a"));
        assert!(!store.unblock("a"));
        assert!(!store.unblock("never-seen"));
        assert!(matches!(store.admit("a", 2, &POLICY), WindowOutcome::Admitted { .. }));
    }

    #[test]
    fn test_ttl_values() {
        let store = MemoryStore::new();
        store.put("k", "v1".into(), 1_000);
        assert_eq!(store.get("k", 1_000), Some(("v1".into(), 1_000)));
        assert!(!store.compare_and_swap("k", "other", "v2".into(), 2_000, 500));
        assert!(store.compare_and_swap("k", "v1", "v2".into(), 2_000, 500));
        assert_eq!(store.get("k", 1_500), Some(("v2".into(), 2_000)));
        assert_eq!(store.get("k", 2_001), None);
        assert!(!store.compare_and_swap("k", "v2", "v3".into(), 3_000, 2_001));
        assert!(!store.remove("k"));
    }

    #[test]
    fn test_log_retention() {
        let store = MemoryStore::new();
        store.append("log", "a".into(), 0, &RETENTION);
        store.append("log", "b".into(), 500, &RETENTION);
        assert_eq!(store.entries("log", 600, &RETENTION), vec!["a", "b"]);
        assert_eq!(store.entries("log", 1_200, &RETENTION), vec!["b"]);

        for (i, e) in ["c", "d", "e"].iter().enumerate() {
            store.append("log", e.to_string(), 600 + i as u64, &RETENTION);
        }
        assert_eq!(store.entries("log", 700, &RETENTION), vec!["c", "d", "e"]);
        assert!(store.entries("missing", 0, &RETENTION).is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let store = MemoryStore::new();
        store.admit("idle", 0, &POLICY);
        store.admit("active", 9_000, &POLICY);
        store.block("blocked", 100_000);
        store.put("csrf", "t".into(), 5_000);
        store.append("log", "x".into(), 0, &RETENTION);

        assert_eq!(store.purge_expired(10_000, &POLICY, &RETENTION), 1);
        let stats = store.stats(10_000);
        assert_eq!(stats.tracked_identities, 2);
        assert_eq!(stats.blacklisted, 1);
        assert_eq!(stats.window_requests, 1);
        assert_eq!(stats.ttl_entries, 0);
        assert!(store.entries("log", 10_000, &RETENTION).is_empty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist.json");

        let store = MemoryStore::new();
        store.block("1.2.3.4", 50_000);
        store.block("5.6.7.8", 2_000);
        assert_eq!(store.save_snapshot(&path, 1_000).unwrap(), 2);

        let restored = MemoryStore::new();
        assert_eq!(restored.load_snapshot(&path, 10_000).unwrap(), 1);
        assert_eq!(restored.blocked_until("1.2.3.4", 10_000), Some(50_000));
        assert_eq!(restored.blocked_until("5.6.7.8", 10_000), None);

        let missing = dir.path().join("none.json");
        assert_eq!(restored.load_snapshot(&missing, 0).unwrap(), 0);
    }
}
