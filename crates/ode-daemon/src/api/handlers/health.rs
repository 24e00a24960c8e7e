//! Health handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::state::AppState;
use crate::error::ApiResult;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub ledger: LedgerHealth,
    pub subscribers: usize,
}

/// Ledger section of the health response
#[derive(Debug, Serialize)]
pub struct LedgerHealth {
    pub store: String,
    pub entries: usize,
    pub skipped_records: usize,
}

/// Health check endpoint. Reports `degraded` when the store holds records
/// that could not be replayed.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthCheckResponse>> {
    let replay = state.ledger.replay().await?;
    let status = if replay.is_clean() { "healthy" } else { "degraded" };

    Ok(Json(HealthCheckResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        ledger: LedgerHealth {
            store: state.ledger.describe(),
            entries: replay.entries.len(),
            skipped_records: replay.skipped.len(),
        },
        subscribers: state.feed.subscriber_count().await,
    }))
}
