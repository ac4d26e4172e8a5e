//! Configuration validation.
//!
//! Serde handles the syntactic side; this module checks value ranges,
//! signature patterns and cross-field constraints. All errors are collected,
//! not just the first.

use std::collections::HashSet;

use regex::RegexBuilder;
use thiserror::Error;

use crate::config::schema::{AppConfig, CsrfStrategy, GuardConfig};

/// Minimum length of a configured stateless CSRF secret.
pub const MIN_SECRET_LEN: usize = 16;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid address {value:?} for {field}")]
    Address { field: &'static str, value: String },

    #[error("signature {id:?} has an invalid pattern: {reason}")]
    Pattern { id: String, reason: String },

    #[error("signature id {0:?} is used more than once")]
    DuplicateSignature(String),

    #[error("honeypot path {0:?} must start with '/'")]
    HoneypotPath(String),

    #[error("stateless CSRF secret must be at least {} bytes", MIN_SECRET_LEN)]
    WeakSecret,

    #[error("exit list url {0:?} is not a valid http(s) URL")]
    ListUrl(String),
}

/// Validate a full application configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "listener.request_timeout_secs" });
    }
    if config.admin.enabled && config.admin.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }
    if config.store.sweep_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "store.sweep_interval_secs" });
    }

    if let Err(guard_errors) = validate_guard(&config.guard) {
        errors.extend(guard_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the guard-only part of a configuration.
pub fn validate_guard(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let rate = &config.rate_limit;
    if rate.limit == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.limit" });
    }
    if rate.interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.interval_secs" });
    }
    if rate.block_time_secs == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.block_time_secs" });
    }
    if rate.violation_threshold == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.violation_threshold" });
    }

    let mut seen = HashSet::new();
    for sig in &config.waf.signatures {
        if !seen.insert(sig.id.as_str()) {
            errors.push(ValidationError::DuplicateSignature(sig.id.clone()));
        }
        if let Err(e) = RegexBuilder::new(&sig.pattern).case_insensitive(true).build() {
            errors.push(ValidationError::Pattern {
                id: sig.id.clone(),
                reason: e.to_string(),
            });
        }
    }

    for path in &config.honeypot.paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::HoneypotPath(path.clone()));
        }
    }

    let csrf = &config.csrf;
    if csrf.token_ttl_secs == 0 {
        errors.push(ValidationError::Zero { field: "csrf.token_ttl_secs" });
    }
    if csrf.strategy == CsrfStrategy::Stateless {
        if csrf.stateless_window_secs == 0 {
            errors.push(ValidationError::Zero { field: "csrf.stateless_window_secs" });
        }
        if !csrf.secret.is_empty() && csrf.secret.len() < MIN_SECRET_LEN {
            errors.push(ValidationError::WeakSecret);
        }
    }

    let anonymity = &config.anonymity;
    if anonymity.enabled {
        match url::Url::parse(&anonymity.list_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError::ListUrl(anonymity.list_url.clone())),
        }
        if anonymity.refresh_interval_secs == 0 {
            errors.push(ValidationError::Zero { field: "anonymity.refresh_interval_secs" });
        }
        if anonymity.fetch_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "anonymity.fetch_timeout_secs" });
        }
    }

    if config.attack_log.max_entries == 0 {
        errors.push(ValidationError::Zero { field: "attack_log.max_entries" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
