//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_verdicts_total` (counter): stage decisions by `stage`, `outcome`
//! - `guard_blacklisted_total` (counter): identities blacklisted
//! - `guard_exit_list_refresh_total` (counter): refreshes by `outcome`
//! - `guard_exit_list_size` (gauge): relays in the cached set
//! - `guard_attack_log_entries` (gauge): live attack log entries
//! - `guard_tracked_identities` (gauge): identities with rate-limit state
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::security::verdict::Verdict;

pub const VERDICTS_TOTAL: &str = "guard_verdicts_total";
pub const BLACKLISTED_TOTAL: &str = "guard_blacklisted_total";
pub const EXIT_LIST_REFRESH_TOTAL: &str = "guard_exit_list_refresh_total";
pub const EXIT_LIST_SIZE: &str = "guard_exit_list_size";
pub const ATTACK_LOG_ENTRIES: &str = "guard_attack_log_entries";
pub const TRACKED_IDENTITIES: &str = "guard_tracked_identities";

/// Install the Prometheus recorder and its scrape listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    describe_counter!(VERDICTS_TOTAL, "Guard stage decisions");
    describe_counter!(BLACKLISTED_TOTAL, "Identities blacklisted");
    describe_counter!(EXIT_LIST_REFRESH_TOTAL, "Exit relay list refresh attempts");
    describe_gauge!(EXIT_LIST_SIZE, "Relays in the cached exit list");
    describe_gauge!(ATTACK_LOG_ENTRIES, "Live attack log entries");
    describe_gauge!(TRACKED_IDENTITIES, "Identities with rate-limit state");
}

pub fn record_verdict(stage: &'static str, verdict: &Verdict) {
    counter!(VERDICTS_TOTAL, "stage" => stage, "outcome" => verdict.label()).increment(1);
}

pub fn record_blacklisted() {
    counter!(BLACKLISTED_TOTAL).increment(1);
}

pub fn record_exit_list_refresh(outcome: &'static str) {
    counter!(EXIT_LIST_REFRESH_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_exit_list_size(size: usize) {
    gauge!(EXIT_LIST_SIZE).set(size as f64);
}

pub fn record_attack_log_size(size: usize) {
    gauge!(ATTACK_LOG_ENTRIES).set(size as f64);
}

pub fn record_tracked_identities(count: usize) {
    gauge!(TRACKED_IDENTITIES).set(count as f64);
}
