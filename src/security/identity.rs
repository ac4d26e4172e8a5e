//! Client identity resolution.
//!
//! With `trusted_proxies = n`, the last `n` entries of `X-Forwarded-For` were
//! appended by our own proxies; the entry just before them is the client.
//! Anything further left is client-controlled and ignored.

use std::net::IpAddr;

use crate::security::request::GuardRequest;

pub const LOOPBACK: &str = "127.0.0.1";
const UNKNOWN: &str = "unknown";

/// Canonical form of an address: IPv4-mapped IPv6 collapses to IPv4 and any
/// loopback address becomes `127.0.0.1`.
pub fn normalize_ip(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("localhost") {
        return Some(LOOPBACK.to_string());
    }
    let ip: IpAddr = raw.trim_start_matches('[').trim_end_matches(']').parse().ok()?;
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    };
    if ip.is_loopback() {
        Some(LOOPBACK.to_string())
    } else {
        Some(ip.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver {
    trusted_proxies: usize,
}

impl IdentityResolver {
    pub fn new(trusted_proxies: usize) -> Self {
        Self { trusted_proxies }
    }

    /// Never fails; falls back to the socket address and finally to a fixed
    /// placeholder.
    pub fn resolve(&self, request: &GuardRequest) -> String {
        if let Some(forwarded) = self.from_forwarded(request) {
            return forwarded;
        }
        request
            .remote_addr
            .and_then(|addr| normalize_ip(&addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn from_forwarded(&self, request: &GuardRequest) -> Option<String> {
        if self.trusted_proxies == 0 {
            return None;
        }
        let chain: Vec<&str> = request
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("x-forwarded-for"))
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .collect();

        if chain.len() <= self.trusted_proxies {
            return None;
        }
        normalize_ip(chain[chain.len() - self.trusted_proxies - 1])
    }
}
