//! Admin API.
//!
//! Served on its own listener so it can stay bound to a private interface.
//! Every route requires the configured bearer key.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::security::SharedGuard;

#[derive(Clone)]
pub struct AdminState {
    pub guard: SharedGuard,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(guard: SharedGuard, api_key: &str) -> Self {
        Self {
            guard,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/attacks", get(get_attacks))
        .route("/admin/stats", get(get_stats))
        .route(
            "/admin/blacklist/{identity}",
            post(block_identity).delete(unblock_identity),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::GuardConfig;
    use crate::security::{ExitNodeCache, Guard};
    use crate::store::MemoryStore;
    use arc_swap::ArcSwap;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const KEY: &str = "test-admin-key";

    fn router() -> (Router, SharedGuard) {
        let guard = Guard::with_parts(
            GuardConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_000_000)),
            Arc::new(ExitNodeCache::new()),
        )
        .unwrap();
        let shared: SharedGuard = Arc::new(ArcSwap::from_pointee(guard));
        (setup_admin_router(AdminState::new(shared.clone(), KEY)), shared)
    }

    fn authed(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {KEY}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_requires_key() {
        let (router, _) = router();
        let response = router
            .clone()
            .oneshot(Request::get("/admin/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let wrong = Request::get("/admin/stats")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(router.oneshot(wrong).await.unwrap().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_block_and_unblock() {
        let (router, guard) = router();

        let response = router
            .clone()
            .oneshot(authed("POST", "/admin/blacklist/198.51.100.4?secs=60"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let blocked: handlers::BlockResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(blocked.blocked_until_ms, 1_060_000);
        assert!(guard.load().blocked_until("198.51.100.4").is_some());

        let response = router
            .clone()
            .oneshot(authed("DELETE", "/admin/blacklist/198.51.100.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(authed("DELETE", "/admin/blacklist/198.51.100.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_and_attacks() {
        let (router, _) = router();
        let response = router.clone().oneshot(authed("GET", "/admin/stats")).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["limit"], 15);

        let response = router.oneshot(authed("GET", "/admin/attacks")).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        assert_eq!(&body[..], b"[]");
    }
}
