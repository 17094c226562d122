use axum::{
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use velora_core::Actor;
use velora_order::assignment::{AssignmentOutcome, BulkAssignOutcome};
use velora_order::manager::{
    CartLine, CreateOrderRequest, CreatedOrder, OrderView, ShippingInfo,
};
use velora_order::models::{OrderActivity, OrderStatus, PaymentMethod};
use velora_shared::pii::Masked;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ShippingBody {
    pub recipient: String,
    pub phone: Masked<String>,
    pub address_line: String,
    pub city: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    pub customer_id: i64,
    pub lines: Vec<CartLine>,
    pub shipping: ShippingBody,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub target: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub worker_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct BulkAssignRequest {
    pub order_ids: Vec<i64>,
    pub worker_id: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
/// Create an order from an upstream-priced cart; the fraud gate runs inside.
pub async fn create_order(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<CreatedOrder>), AppError> {
    let created = state
        .manager
        .create_order(CreateOrderRequest {
            customer_id: body.customer_id,
            lines: body.lines,
            shipping: ShippingInfo {
                recipient: body.shipping.recipient,
                phone: body.shipping.phone.into_inner(),
                address_line: body.shipping.address_line,
                city: body.shipping.city,
            },
            payment_method: body.payment_method,
            client_ip: addr.ip().to_string(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /v1/orders/{id}
/// Retrieve the order with its delivery attempts and settlement entry.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(state.manager.order_view(order_id).await?))
}

/// GET /v1/orders/{id}/activity
/// The append-only audit trail for one order.
pub async fn get_activity(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Vec<OrderActivity>>, AppError> {
    Ok(Json(state.manager.activity_for(order_id).await?))
}

/// POST /v1/orders/{id}/transition
/// Apply one role-scoped lifecycle transition; unassigned orders are
/// claimed by the acting worker in the same write.
pub async fn transition_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<OrderActivity>, AppError> {
    let record = state.manager.transition(order_id, req.target, actor).await?;
    Ok(Json(record))
}

/// POST /v1/orders/{id}/assign
pub async fn assign_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    let outcome = state
        .manager
        .assign_order(order_id, req.worker_id, actor)
        .await?;
    Ok(Json(outcome))
}

/// POST /v1/orders/bulk-assign
/// Per-order results; one claimed or terminal order never aborts the batch.
pub async fn bulk_assign(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<BulkAssignRequest>,
) -> Result<Json<Vec<BulkAssignOutcome>>, AppError> {
    let outcomes = state
        .manager
        .bulk_assign(&req.order_ids, req.worker_id, actor)
        .await?;
    Ok(Json(outcomes))
}
