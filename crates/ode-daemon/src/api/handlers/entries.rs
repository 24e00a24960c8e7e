//! Ledger snapshot handler

use axum::{
    extract::{Query, State},
    Json,
};
use ode_ledger::LedgerEntry;
use serde::Deserialize;

use crate::api::state::AppState;
use crate::error::ApiResult;

/// Query parameters for `GET /api/entries`
#[derive(Debug, Default, Deserialize)]
pub struct EntriesQuery {
    /// Skip the first `from` entries
    pub from: Option<usize>,
}

/// The ledger in write order.
pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<Json<Vec<LedgerEntry>>> {
    let entries = match query.from {
        Some(position) => state.ledger.read_from(position).await?,
        None => state.ledger.read_all().await?,
    };
    Ok(Json(entries))
}
