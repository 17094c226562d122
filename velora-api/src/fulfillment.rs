use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use velora_core::Actor;
use velora_order::delivery::DeliveryConfirmation;
use velora_order::models::DeliveryAttempt;
use velora_order::packaging::PackagingOutcome;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AttemptRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmDeliveryRequest {
    /// Reference of an already-stored proof artifact.
    pub proof_ref: Option<String>,
    /// Raw proof payload; stored through the proof storage collaborator
    /// when no reference is supplied.
    pub proof_payload: Option<String>,
    #[serde(default)]
    pub otp_used: bool,
    #[serde(default)]
    pub signature_captured: bool,
}

/// POST /v1/orders/{id}/package
/// Count one packed parcel; the first parcel moves the order into
/// processing and claims the packaging slot.
pub async fn mark_packaged(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<PackagingOutcome>, AppError> {
    Ok(Json(state.manager.mark_packaged(order_id, actor).await?))
}

/// POST /v1/orders/{id}/delivery-attempt
/// Audit-only record of a failed visit; the status does not move.
pub async fn attempt_delivery(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<AttemptRequest>,
) -> Result<Json<DeliveryAttempt>, AppError> {
    let attempt = state
        .manager
        .attempt_delivery(order_id, &req.reason, actor)
        .await?;
    Ok(Json(attempt))
}

/// POST /v1/orders/{id}/confirm-delivery
/// Proof-of-delivery confirmation. A raw payload is stored first; a
/// missing artifact fails before anything is written.
pub async fn confirm_delivery(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ConfirmDeliveryRequest>,
) -> Result<Json<DeliveryConfirmation>, AppError> {
    let proof_ref = match (req.proof_ref, req.proof_payload) {
        (Some(reference), _) => Some(reference),
        (None, Some(payload)) if !payload.trim().is_empty() => Some(
            state
                .proof_storage
                .store_proof(order_id, payload.as_bytes())
                .await?,
        ),
        _ => None,
    };

    let confirmation = state
        .manager
        .confirm_delivery(
            order_id,
            proof_ref.as_deref(),
            req.otp_used,
            req.signature_captured,
            actor,
        )
        .await?;
    Ok(Json(confirmation))
}
