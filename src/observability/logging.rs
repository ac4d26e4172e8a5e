//! Structured logging.
//!
//! # Design Decisions
//! - `tracing` events with key/value fields everywhere in the library
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directives for a configured `level`.
pub fn default_directives(level: &str) -> String {
    format!("request_guard={level},tower_http={level}")
}

/// Install the global subscriber. Later calls are ignored so tests and
/// embedders that already installed one keep it.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives(level).into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
