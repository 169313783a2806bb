use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::handlers::common::{success_response, validate_input};
use crate::services::orders::{OrderFilter, RefundRequest};
use crate::{errors::ServiceError, AppState};

/// Customer-facing order reads
pub fn orders_routes() -> Router<AppState> {
    Router::new().route("/:id/summary", get(get_order_summary))
}

/// Admin order management, mounted under `/admin/orders`
pub fn admin_orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id/status", put(update_order_status))
        .route("/:id/refund", post(refund_order))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

async fn get_order_summary(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state.services.orders.order_summary(&ctx, order_id).await?;
    Ok(success_response(summary))
}

async fn list_orders(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(filter): Query<OrderFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&filter)?;
    let page = state.services.orders.list_orders(&ctx, filter).await?;
    Ok(success_response(page))
}

async fn update_order_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(&ctx, order_id, &payload.status)
        .await?;
    Ok(success_response(order))
}

async fn refund_order(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .orders
        .process_refund(&ctx, order_id, payload)
        .await?;
    Ok(success_response(outcome))
}
