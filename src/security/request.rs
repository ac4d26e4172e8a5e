//! Transport-neutral view of an inbound request.
//!
//! Collaborators populate a [`GuardRequest`] once from whatever server
//! framework they run; the guard pipeline never sees framework types.

use std::borrow::Cow;
use std::net::SocketAddr;

/// Methods that never change server state and therefore skip CSRF checks.
const SAFE_METHODS: [&str; 4] = ["GET", "HEAD", "OPTIONS", "TRACE"];

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An already-parsed HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardRequest {
    pub method: String,
    /// Path component only, without query or fragment.
    pub path: String,
    /// Request target as received (origin-form or absolute URL).
    pub url: String,
    /// Header name/value pairs in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub remote_addr: Option<SocketAddr>,
}

impl GuardRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path_of(&url),
            url,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or_default()
    }

    pub fn is_safe_method(&self) -> bool {
        SAFE_METHODS.contains(&self.method.as_str())
    }

    pub fn query(&self) -> Option<&str> {
        let rest = self.url.split_once('?')?.1;
        Some(rest.split_once('#').map_or(rest, |(q, _)| q))
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_form(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
    }

    /// A field of a url-encoded form body.
    pub fn form_field(&self, name: &str) -> Option<String> {
        if !self.is_form() {
            return None;
        }
        url::form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

fn path_of(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        return parsed.path().to_string();
    }
    let end = url.find(|c| c == '?' || c == '#').unwrap_or(url.len());
    match &url[..end] {
        "" => "/".to_string(),
        path => path.to_string(),
    }
}
