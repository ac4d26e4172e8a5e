use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::security::{AttackLogEntry, GuardStats};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct BlockParams {
    /// Block duration; defaults to the configured rate-limit block time.
    pub secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockResponse {
    pub identity: String,
    pub blocked_until_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnblockResponse {
    pub identity: String,
    pub removed: bool,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_attacks(State(state): State<AdminState>) -> Json<Vec<AttackLogEntry>> {
    Json(state.guard.load().list_attacks())
}

pub async fn get_stats(State(state): State<AdminState>) -> Json<GuardStats> {
    Json(state.guard.load().stats())
}

pub async fn block_identity(
    State(state): State<AdminState>,
    Path(identity): Path<String>,
    Query(params): Query<BlockParams>,
) -> Json<BlockResponse> {
    let guard = state.guard.load();
    let secs = params
        .secs
        .unwrap_or(guard.config().rate_limit.block_time_secs);
    let blocked_until_ms = guard.block_identity(&identity, Duration::from_secs(secs));
    Json(BlockResponse {
        identity,
        blocked_until_ms,
    })
}

/// 404 when no active blacklist entry existed.
pub async fn unblock_identity(
    State(state): State<AdminState>,
    Path(identity): Path<String>,
) -> (StatusCode, Json<UnblockResponse>) {
    let removed = state.guard.load().unblock_identity(&identity);
    let status = if removed { StatusCode::OK } else { StatusCode::NOT_FOUND };
    (status, Json(UnblockResponse { identity, removed }))
}
