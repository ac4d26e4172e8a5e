//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard
//! and the demonstration server around it. All types derive Serde traits for
//! deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the guarded server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// State store housekeeping and persistence.
    pub store: StoreConfig,

    /// Guard pipeline configuration.
    #[serde(flatten)]
    pub guard: GuardConfig,
}

/// Configuration consumed by the guard pipeline itself.
///
/// Passed by value into [`crate::security::Guard`]; it never changes for the
/// lifetime of a guard instance.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    pub identity: IdentityConfig,
    pub rate_limit: RateLimitConfig,
    pub waf: WafConfig,
    pub csrf: CsrfConfig,
    pub honeypot: HoneypotConfig,
    pub anonymity: AnonymityConfig,
    pub attack_log: AttackLogConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Client identity resolution.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Number of reverse proxies in front of the server whose
    /// `X-Forwarded-For` entries are trusted.
    pub trusted_proxies: usize,
}

/// Sliding-window rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per identity within one window.
    pub limit: usize,

    /// Window length in seconds.
    pub interval_secs: u64,

    /// Blacklist duration in seconds.
    pub block_time_secs: u64,

    /// Breaches before an identity is blacklisted.
    pub violation_threshold: u32,

    /// A breach this long after the previous one starts a fresh count.
    /// Zero disables decay.
    pub violation_decay_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 15,
            interval_secs: 10,
            block_time_secs: 300,
            violation_threshold: 3,
            violation_decay_secs: 3600,
        }
    }
}

/// A single WAF signature.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SignatureConfig {
    /// Identifier reported in attack logs.
    pub id: String,

    /// Regular expression, matched case-insensitively.
    pub pattern: String,
}

impl SignatureConfig {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
        }
    }
}

/// Signature filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WafConfig {
    /// Enable the signature filter.
    pub enabled: bool,

    /// Ordered signature list; the first match wins.
    pub signatures: Vec<SignatureConfig>,
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signatures: default_signatures(),
        }
    }
}

/// Built-in signatures covering injection, XSS and traversal payloads.
pub fn default_signatures() -> Vec<SignatureConfig> {
    vec![
        SignatureConfig::new("sqli-union-select", r"\bunion\b.*\bselect\b"),
        SignatureConfig::new("sqli-drop-table", r"\bdrop\b.*\btable\b"),
        SignatureConfig::new("xss-script-tag", r"<script"),
        SignatureConfig::new("xss-event-handler", r"\bon(error|load|click|mouseover|focus)\s*="),
        SignatureConfig::new("xss-alert", r"alert\("),
        SignatureConfig::new("path-traversal", r"\.\./|\.\.\\|/etc/passwd"),
        SignatureConfig::new("cmd-exec", r"exec\s*\("),
        SignatureConfig::new("code-eval", r"eval\s*\("),
        SignatureConfig::new("iframe-injection", r"<iframe"),
    ]
}

/// How CSRF tokens are produced and checked.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CsrfStrategy {
    /// Random token stored against the session.
    #[default]
    Session,
    /// Keyed hash of a timestamp; no server-side state.
    Stateless,
}

/// CSRF configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Enable CSRF checks in the pipeline.
    pub enabled: bool,

    pub strategy: CsrfStrategy,

    /// Lifetime of session-bound tokens in seconds.
    pub token_ttl_secs: u64,

    /// Server secret for stateless tokens. Generated at startup when empty.
    pub secret: String,

    /// Trailing window accepted for stateless tokens, in seconds.
    pub stateless_window_secs: u64,

    /// Form field carrying the token.
    pub form_field: String,

    /// Header carrying the token.
    pub header_name: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: CsrfStrategy::Session,
            token_ttl_secs: 3600,
            secret: String::new(),
            stateless_window_secs: 300,
            form_field: "csrf_token".to_string(),
            header_name: "x-csrf-token".to_string(),
        }
    }
}

/// Honeypot configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HoneypotConfig {
    /// Decoy paths; a request to one of them or beneath it is trapped.
    pub paths: Vec<String>,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            paths: vec![
                "/admin".to_string(),
                "/wp-admin".to_string(),
                "/phpmyadmin".to_string(),
                "/.env".to_string(),
            ],
        }
    }
}

/// Anonymity network (Tor exit relay) blocking.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnonymityConfig {
    /// Enable the check.
    pub enabled: bool,

    /// Source of the exit relay list.
    pub list_url: String,

    /// Refresh interval in seconds.
    pub refresh_interval_secs: u64,

    /// Fetch timeout in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for AnonymityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            list_url: "https://check.torproject.org/exit-addresses".to_string(),
            refresh_interval_secs: 1800,
            fetch_timeout_secs: 5,
        }
    }
}

/// Attack log retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AttackLogConfig {
    /// Entries older than this are dropped.
    pub retention_secs: u64,

    /// Oldest entries are evicted beyond this size.
    pub max_entries: usize,
}

impl Default for AttackLogConfig {
    fn default() -> Self {
        Self {
            retention_secs: 86_400,
            max_entries: 10_000,
        }
    }
}

/// State store housekeeping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Blacklist snapshot file, loaded at startup and written at shutdown.
    pub snapshot_path: Option<String>,

    /// Interval between expired-state sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            sweep_interval_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
