use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::commerce::ConfirmPaymentInput;
use crate::ApiResponse;
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tracing::info;
use uuid::Uuid;

pub fn payments_routes() -> Router<AppState> {
    Router::new().route("/confirm", post(confirm_payment))
}

/// Where a settled order can be read back.
pub fn order_summary_location(order_id: Uuid) -> String {
    format!("/api/v1/orders/{}/summary", order_id)
}

/// Gateway success callback. Settles the payment into an order and points the
/// client at its summary. Replays of an already settled payment get the same
/// redirect.
async fn confirm_payment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<ConfirmPaymentInput>,
) -> Result<Response, ServiceError> {
    let outcome = state.services.payments.confirm(&ctx, payload).await?;

    info!(
        order_id = %outcome.order_id,
        replayed = outcome.replayed,
        "Payment confirmation answered"
    );

    let location = order_summary_location(outcome.order_id);
    Ok((
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location)],
        Json(ApiResponse::success(outcome)),
    )
        .into_response())
}
