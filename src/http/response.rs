//! Translation of guard rejections into HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::security::{Denial, RejectionKind};

pub fn status_for(kind: RejectionKind) -> StatusCode {
    match kind {
        RejectionKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        RejectionKind::Blocked | RejectionKind::Forbidden => StatusCode::FORBIDDEN,
        RejectionKind::NotFound => StatusCode::NOT_FOUND,
    }
}

/// A rejected request on its way back to the client.
#[derive(Debug, Clone)]
pub struct Rejection(pub Denial);

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        // Trapped requests get an ordinary 404 that reveals nothing.
        let message = match kind {
            RejectionKind::NotFound => "Not Found".to_string(),
            _ => self.0.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
