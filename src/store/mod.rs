//! Shared guard state.
//!
//! # Data Flow
//! ```text
//! RateLimiter  → admit()            (blacklist + window + violations, one atomic step)
//! CsrfManager  → put/get/compare_and_swap  (TTL map, one key per session)
//! AttackLog    → append/entries     (retention-bounded list)
//! Sweeper      → purge_expired()    (housekeeping)
//! ```
//!
//! # Design Decisions
//! - Every compound read-modify-write is a single trait call so a backend can
//!   serialize it (per-key locking in process, a transaction over the network)
//! - Values crossing the trait are plain strings; typed data is serialized by
//!   the caller so remote backends need no knowledge of guard types
//! - Time is passed in, never read by the store

pub mod memory;

pub use memory::{MemoryStore, SnapshotError};

/// Parameters of the sliding-window admission step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub limit: usize,
    pub interval_ms: u64,
    pub block_ms: u64,
    pub violation_threshold: u32,
    /// Zero keeps violations until the identity is blacklisted.
    pub violation_decay_ms: u64,
}

/// Result of [`StateStore::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// Within the limit; `count` includes this request.
    Admitted { count: usize },
    /// The identity is blacklisted; nothing was recorded.
    Blacklisted { until_ms: u64 },
    /// Over the limit. `blacklisted_until_ms` is set when this breach
    /// escalated to a blacklist entry.
    Exceeded {
        count: usize,
        violations: u32,
        blacklisted_until_ms: Option<u64>,
    },
}

/// Retention applied to appended logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub ttl_ms: u64,
    pub max_entries: usize,
}

/// Point-in-time view of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Identities with any rate-limit state.
    pub tracked_identities: usize,
    /// Identities currently blacklisted.
    pub blacklisted: usize,
    /// Requests across all live windows.
    pub window_requests: usize,
    /// Live TTL map entries.
    pub ttl_entries: usize,
}

/// Atomic state operations backing the guard pipeline.
pub trait StateStore: Send + Sync {
    /// Blacklist check, window prune, insert, count and escalation for `key`,
    /// executed atomically with respect to other calls for the same key.
    fn admit(&self, key: &str, now_ms: u64, policy: &WindowPolicy) -> WindowOutcome;

    /// Blacklist `key` until `until_ms`, clearing its window and violations.
    fn block(&self, key: &str, until_ms: u64);

    /// Remove a blacklist entry. Returns whether one was active.
    fn unblock(&self, key: &str) -> bool;

    /// Expiry of an active blacklist entry.
    fn blocked_until(&self, key: &str, now_ms: u64) -> Option<u64>;

    /// Set a value that expires at `expires_at_ms`.
    fn put(&self, key: &str, value: String, expires_at_ms: u64);

    /// Read a live value.
    fn get(&self, key: &str, now_ms: u64) -> Option<(String, u64)>;

    /// Replace a live value only if it still equals `expected`.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        value: String,
        expires_at_ms: u64,
        now_ms: u64,
    ) -> bool;

    /// Delete a value. Returns whether it existed.
    fn remove(&self, key: &str) -> bool;

    /// Append to the log at `key`, applying `retention`.
    fn append(&self, key: &str, entry: String, now_ms: u64, retention: &Retention);

    /// Live entries of the log at `key`, oldest first.
    fn entries(&self, key: &str, now_ms: u64, retention: &Retention) -> Vec<String>;

    /// Drop expired windows, values and log entries. Returns how many
    /// identities were forgotten.
    fn purge_expired(&self, now_ms: u64, policy: &WindowPolicy, retention: &Retention) -> usize;

    fn stats(&self, now_ms: u64) -> StoreStats;
}
