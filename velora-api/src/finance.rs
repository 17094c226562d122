use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use velora_core::Actor;
use velora_order::models::CodSettlement;
use velora_order::settlement::SettlementReport;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CollectCodRequest {
    pub amount_minor: i64,
}

/// POST /v1/orders/{id}/collect-cod
/// Record the cash taken at the door; the courier's stated amount is
/// trusted and reconciled later in the settlement report.
pub async fn collect_cod(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CollectCodRequest>,
) -> Result<Json<CodSettlement>, AppError> {
    let entry = state
        .manager
        .collect_cod(order_id, req.amount_minor, actor)
        .await?;
    Ok(Json(entry))
}

/// POST /v1/couriers/{id}/settle
/// Group the courier's collected cash into one terminal settlement batch.
pub async fn settle_batch(
    State(state): State<AppState>,
    Path(courier_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<SettlementReport>, AppError> {
    let report = state.manager.settle_batch(courier_id, actor).await?;
    Ok(Json(report))
}
