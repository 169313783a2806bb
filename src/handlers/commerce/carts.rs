use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, no_content_response, success_response};
use crate::{
    services::commerce::{AddToCartInput, AdjustAction},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

/// Creates the router for the caller's cart
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_to_cart))
        .route("/items/:id/adjust", post(adjust_cart_item))
        .route("/items/:id", delete(remove_cart_item))
}

#[derive(Debug, Deserialize)]
pub struct AdjustItemRequest {
    pub action: AdjustAction,
}

/// Cart lines with the live total
async fn get_cart(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.list(&ctx).await?;
    Ok(success_response(cart))
}

async fn add_to_cart(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<AddToCartInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.services.cart.add(&ctx, payload).await?;
    Ok(created_response(item))
}

async fn adjust_cart_item(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<AdjustItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state
        .services
        .cart
        .adjust(&ctx, item_id, payload.action)
        .await?;
    Ok(success_response(item))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.cart.remove(&ctx, item_id).await?;
    Ok(no_content_response())
}
