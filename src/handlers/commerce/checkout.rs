use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response};
use crate::AppState;
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(start_checkout))
        .route("/buy-now", post(stage_buy_now).delete(cancel_buy_now))
}

#[derive(Debug, Deserialize)]
pub struct BuyNowRequest {
    pub product_id: Uuid,
    /// Clamped to at least one
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Serialize)]
pub struct BuyNowResponse {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Prices the cart (or staged buy-now item) and opens a gateway order
async fn start_checkout(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.checkout.start_checkout(&ctx).await?;
    Ok(created_response(session))
}

async fn stage_buy_now(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<BuyNowRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let slot = state
        .services
        .checkout
        .stage_buy_now(&ctx, payload.product_id, payload.quantity)
        .await?;

    Ok(success_response(BuyNowResponse {
        product_id: slot.product_id,
        quantity: slot.quantity,
    }))
}

async fn cancel_buy_now(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    let cleared = state.services.checkout.cancel_buy_now(&ctx)?;
    Ok(success_response(serde_json::json!({ "cleared": cleared })))
}
