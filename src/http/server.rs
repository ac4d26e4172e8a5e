//! HTTP server with the guard in front of every route.
//!
//! # Responsibilities
//! - Create the Axum router with the sample handlers
//! - Run every request through the guard pipeline
//! - Attach and issue the session cookie used for CSRF binding
//! - Wire up middleware (tracing, body limit, timeout)
//! - Serve until shutdown

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ListenerConfig;
use crate::http::request::{buffer_request, session_cookie, session_from_headers, Session};
use crate::http::response::Rejection;
use crate::lifecycle::signalled;
use crate::security::{SharedGuard, Verdict};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub guard: SharedGuard,
    pub max_body_size: usize,
}

/// HTTP server for the guarded application.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ListenerConfig, guard: SharedGuard) -> Self {
        let state = AppState {
            guard,
            max_body_size: config.max_body_size,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/csrf-token", get(csrf_token))
            .route("/submit", post(submit))
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(state.clone(), guard_middleware))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for serving on a custom transport or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(signalled(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Runs the full guard pipeline. Admitted requests continue with a
/// [`Session`] extension; new sessions get their cookie on the response.
pub async fn guard_middleware(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let existing = session_from_headers(request.headers());
    let session = existing
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let (facade, mut request) = match buffer_request(request, state.max_body_size).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    let guard = state.guard.load();
    let mut response = match guard.run_pipeline(&facade, existing.as_deref()) {
        Verdict::Admitted => {
            request.extensions_mut().insert(Session(session.clone()));
            next.run(request).await
        }
        Verdict::Rejected(denial) => Rejection(denial).into_response(),
    };

    if existing.is_none() {
        if let Ok(cookie) = HeaderValue::from_str(&session_cookie(&session)) {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
    }
    response
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" })))
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn csrf_token(State(state): State<AppState>, Extension(Session(session)): Extension<Session>) -> Json<serde_json::Value> {
    let token = state.guard.load().issue_csrf_token(&session);
    Json(json!({ "csrf_token": token }))
}

/// Reaching the handler means the token was valid; a fresh one replaces it.
async fn submit(State(state): State<AppState>, Extension(Session(session)): Extension<Session>) -> Json<serde_json::Value> {
    let next_token = state.guard.load().issue_csrf_token(&session);
    Json(json!({ "status": "accepted", "csrf_token": next_token }))
}
