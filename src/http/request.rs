//! Conversion from axum requests to the guard's request facade.
//!
//! # Design Decisions
//! - The body is buffered once, inspected, and handed back to the inner
//!   service unchanged
//! - Header values that are not valid UTF-8 are skipped; none of the
//!   checks can use them

use std::net::SocketAddr;

use axum::{
    body::{self, Body, Bytes},
    extract::ConnectInfo,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::security::GuardRequest;

/// Cookie carrying the session id used for CSRF binding.
pub const SESSION_COOKIE: &str = "guard_session";

/// Session id attached to admitted requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session(pub String);

/// Buffer `request` and build the facade. Returns the rebuilt request with
/// the same body, or a 413 response when the body exceeds `limit`.
pub async fn buffer_request(
    request: Request<Body>,
    limit: usize,
) -> Result<(GuardRequest, Request<Body>), Response> {
    let (parts, body) = request.into_parts();
    let bytes: Bytes = body::to_bytes(body, limit)
        .await
        .map_err(|_| (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response())?;

    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let mut guard_request = GuardRequest::new(parts.method.as_str(), parts.uri.to_string())
        .with_body(bytes.to_vec());
    guard_request.headers = header_pairs(&parts.headers);
    guard_request.remote_addr = remote_addr;

    Ok((guard_request, Request::from_parts(parts, Body::from(bytes))))
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// The session id from the `Cookie` headers, if present and non-empty.
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(session: &str) -> String {
    format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Strict")
}
