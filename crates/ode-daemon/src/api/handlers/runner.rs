//! Runner status handler

use axum::{extract::State, Json};
use ode_runner::RunnerStatus;

use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};

/// Latest status snapshot published by the autonomous runner.
pub async fn runner_status(State(state): State<AppState>) -> ApiResult<Json<RunnerStatus>> {
    let status = state
        .runner_status
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("autonomous runner is disabled".to_string()))?;
    let snapshot = status.borrow().clone();
    Ok(Json(snapshot))
}
