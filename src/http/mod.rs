//! HTTP surface of the demonstration server.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing, body limit, timeout)
//!     → guard_middleware
//!         → request.rs (buffer body, build GuardRequest, session cookie)
//!         → Guard::run_pipeline
//!         → response.rs (Denial → status + JSON body)
//!     → handlers (only when admitted)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{Session, SESSION_COOKIE};
pub use response::Rejection;
pub use server::{AppState, HttpServer};
