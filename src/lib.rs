//! Request admission guard.
//!
//! A library of request-screening stages (identity resolution, rate
//! limiting with blacklist escalation, anonymity network blocking, payload
//! signatures, CSRF tokens, honeypot paths) composed into one ordered
//! pipeline, plus the axum server and admin API that host it.

pub mod admin;
pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;

pub use config::{AppConfig, GuardConfig};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::{Guard, GuardRequest, SharedGuard, Verdict};
pub use store::{MemoryStore, StateStore};
