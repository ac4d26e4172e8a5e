//! Guard decisions and the rejection taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol-level class of a rejection. Collaborators map these onto their
/// own error representation (e.g. an HTTP status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionKind {
    TooManyRequests,
    Blocked,
    Forbidden,
    NotFound,
}

/// Category under which an attack is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackCategory {
    RateLimitExceeded,
    BlacklistedAccess,
    #[serde(rename = "WAFBlock")]
    WafBlock,
    #[serde(rename = "CSRFMissing")]
    CsrfMissing,
    #[serde(rename = "CSRFInvalid")]
    CsrfInvalid,
    HoneypotTriggered,
    TorAccessAttempt,
}

impl AttackCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackCategory::RateLimitExceeded => "RateLimitExceeded",
            AttackCategory::BlacklistedAccess => "BlacklistedAccess",
            AttackCategory::WafBlock => "WAFBlock",
            AttackCategory::CsrfMissing => "CSRFMissing",
            AttackCategory::CsrfInvalid => "CSRFInvalid",
            AttackCategory::HoneypotTriggered => "HoneypotTriggered",
            AttackCategory::TorAccessAttempt => "TorAccessAttempt",
        }
    }
}

impl std::fmt::Display for AttackCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the rate limiter refused admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionFailure {
    #[error("rate limit exceeded: {count} requests in window (limit {limit})")]
    Exceeded { count: usize, limit: usize },

    #[error("identity blacklisted until {until_ms}")]
    Blacklisted { until_ms: u64 },
}

/// Why a CSRF check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CsrfFailure {
    #[error("CSRF token expired or missing")]
    Missing,

    #[error("CSRF token invalid")]
    Invalid,
}

/// A terminal rejection of the current request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("admission denied: {0}")]
    AdmissionDenied(AdmissionFailure),

    #[error("malicious pattern detected: {signature}")]
    PayloadRejected { signature: String },

    #[error("{0}")]
    TokenRejected(CsrfFailure),

    #[error("attempted access to {path}")]
    TrapTriggered { path: String },

    #[error("{identity} matches an anonymity network exit relay")]
    OriginRejected { identity: String },
}

impl Denial {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Denial::AdmissionDenied(AdmissionFailure::Exceeded { .. }) => RejectionKind::TooManyRequests,
            Denial::AdmissionDenied(AdmissionFailure::Blacklisted { .. }) => RejectionKind::Blocked,
            Denial::PayloadRejected { .. } => RejectionKind::Blocked,
            Denial::TokenRejected(_) => RejectionKind::Forbidden,
            Denial::TrapTriggered { .. } => RejectionKind::NotFound,
            Denial::OriginRejected { .. } => RejectionKind::Forbidden,
        }
    }

    pub fn category(&self) -> AttackCategory {
        match self {
            Denial::AdmissionDenied(AdmissionFailure::Exceeded { .. }) => AttackCategory::RateLimitExceeded,
            Denial::AdmissionDenied(AdmissionFailure::Blacklisted { .. }) => AttackCategory::BlacklistedAccess,
            Denial::PayloadRejected { .. } => AttackCategory::WafBlock,
            Denial::TokenRejected(CsrfFailure::Missing) => AttackCategory::CsrfMissing,
            Denial::TokenRejected(CsrfFailure::Invalid) => AttackCategory::CsrfInvalid,
            Denial::TrapTriggered { .. } => AttackCategory::HoneypotTriggered,
            Denial::OriginRejected { .. } => AttackCategory::TorAccessAttempt,
        }
    }
}

/// Outcome of one guard stage or of the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Admitted,
    Rejected(Denial),
}

impl Verdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Verdict::Admitted)
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Verdict::Admitted => None,
            Verdict::Rejected(denial) => Some(denial),
        }
    }

    pub fn kind(&self) -> Option<RejectionKind> {
        self.denial().map(Denial::kind)
    }

    pub fn detail(&self) -> Option<String> {
        self.denial().map(ToString::to_string)
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Verdict::Admitted => "admitted",
            Verdict::Rejected(denial) => denial.category().as_str(),
        }
    }
}

impl From<Denial> for Verdict {
    fn from(denial: Denial) -> Self {
        Verdict::Rejected(denial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let exceeded = Denial::AdmissionDenied(AdmissionFailure::Exceeded { count: 16, limit: 15 });
        assert_eq!(exceeded.kind(), RejectionKind::TooManyRequests);
        assert_eq!(exceeded.category(), AttackCategory::RateLimitExceeded);

        let blacklisted = Denial::AdmissionDenied(AdmissionFailure::Blacklisted { until_ms: 1 });
        assert_eq!(blacklisted.kind(), RejectionKind::Blocked);

        let trap = Denial::TrapTriggered { path: "/wp-admin".into() };
        assert_eq!(trap.kind(), RejectionKind::NotFound);
        assert_eq!(trap.to_string(), "attempted access to /wp-admin");

        assert_eq!(Denial::TokenRejected(CsrfFailure::Invalid).kind(), RejectionKind::Forbidden);
    }

    #[test]
    fn test_verdict_accessors() {
        assert!(Verdict::Admitted.is_admitted());
        assert_eq!(Verdict::Admitted.kind(), None);

        let v: Verdict = Denial::PayloadRejected { signature: "sqli-union-select".into() }.into();
        assert!(!v.is_admitted());
        assert_eq!(v.kind(), Some(RejectionKind::Blocked));
        assert_eq!(v.detail().unwrap(), "malicious pattern detected: sqli-union-select");
    }

    #[test]
    fn test_category_wire_names() {
        assert_eq!(serde_json::to_string(&AttackCategory::WafBlock).unwrap(), "\"WAFBlock\"");
        assert_eq!(serde_json::to_string(&AttackCategory::TorAccessAttempt).unwrap(), "\"TorAccessAttempt\"");
        assert_eq!(AttackCategory::CsrfMissing.to_string(), "CSRFMissing");
    }
}
