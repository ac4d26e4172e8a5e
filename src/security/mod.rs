//! Request admission guard.
//!
//! # Data Flow
//! ```text
//! transport request
//!     → GuardRequest (request.rs, framework-independent facade)
//!     → Guard::run_pipeline (guard.rs)
//!         → identity.rs     (client identity from socket / X-Forwarded-For)
//!         → rate_limit.rs   (sliding window, escalation to blacklist)
//!         → anonymity.rs    (exit relay set, refreshed in the background)
//!         → signatures.rs   (ordered payload signatures)
//!         → csrf.rs         (session-bound or stateless tokens)
//!         → honeypot.rs     (decoy paths)
//!     → Verdict (verdict.rs)
//!     → attack_log.rs on every rejection
//! ```
//!
//! # Design Decisions
//! - Fail closed on request content, fail open on the external relay list
//! - Cheap blacklist lookup runs before payload inspection
//! - No trust in client input beyond the configured proxy hops

pub mod anonymity;
pub mod attack_log;
pub mod csrf;
pub mod guard;
pub mod honeypot;
pub mod identity;
pub mod rate_limit;
pub mod request;
pub mod signatures;
pub mod sweeper;
pub mod verdict;

pub use anonymity::{parse_exit_list, AnonymityBlocker, ExitNodeCache, ExitNodeRefresher, RefreshError};
pub use attack_log::{AttackLog, AttackLogEntry};
pub use csrf::{CsrfManager, CsrfSubmission};
pub use guard::{Guard, GuardStats, SharedGuard};
pub use honeypot::Honeypot;
pub use identity::IdentityResolver;
pub use rate_limit::RateLimiter;
pub use request::GuardRequest;
pub use signatures::{SignatureFilter, SignatureSet};
pub use sweeper::Sweeper;
pub use verdict::{AdmissionFailure, AttackCategory, CsrfFailure, Denial, RejectionKind, Verdict};
