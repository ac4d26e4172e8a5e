//! Decoy paths. Anything touching them is an attacker probing for admin
//! surfaces, so the request is answered as if the path did not exist.

use crate::config::HoneypotConfig;
use crate::security::verdict::{Denial, Verdict};

#[derive(Debug, Clone, Default)]
pub struct Honeypot {
    paths: Vec<String>,
}

impl Honeypot {
    pub fn new(config: &HoneypotConfig) -> Self {
        Self {
            paths: config
                .paths
                .iter()
                .map(|p| p.trim_end_matches('/').to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Exact match or a sub-path of a decoy, ignoring ASCII case.
    /// `/admin` traps `/admin/` and `/admin/users` but not `/administrator`.
    pub fn is_trap(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.paths.iter().any(|decoy| match path.strip_prefix(decoy.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        })
    }

    pub fn check(&self, path: &str) -> Verdict {
        if self.is_trap(path) {
            Denial::TrapTriggered {
                path: path.to_string(),
            }
            .into()
        } else {
            Verdict::Admitted
        }
    }
}
