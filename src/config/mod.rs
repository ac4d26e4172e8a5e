//! Guard and server configuration.
//!
//! # Data Flow
//! ```text
//! request-guard.toml
//!     → loader.rs      TOML into AppConfig, every field defaulted
//!     → validation.rs  collects every semantic error, not just the first
//!     → AppConfig      listener, admin, store, observability sections
//!         └─ GuardConfig  moved by value into Guard::new
//!
//! Hot reload (watcher.rs):
//!     parent directory event for the file
//!     → unchanged content is ignored
//!     → invalid content is logged and dropped
//!     → valid GuardConfig → Guard::reconfigure → ArcSwap::store
//! ```
//!
//! The guard owns its config and never mutates it. Counters, blacklists and
//! the exit relay set live in the state store and the exit-node cache, so a
//! reload swaps rules without resetting what the guard has learned.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AnonymityConfig, AppConfig, AttackLogConfig, CsrfConfig, CsrfStrategy,
    GuardConfig, HoneypotConfig, IdentityConfig, ListenerConfig, ObservabilityConfig,
    RateLimitConfig, SignatureConfig, StoreConfig, WafConfig,
};
pub use validation::{validate_config, validate_guard, ValidationError};
