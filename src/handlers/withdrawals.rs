use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::handlers::common::{created_response, success_response};
use crate::services::{
    commission::InfluencerEarnings,
    withdrawals::{RequestWithdrawalInput, ReviewWithdrawalInput, WithdrawalHistory},
};
use crate::{errors::ServiceError, AppState};

/// Influencer self-service, mounted under `/influencer`
pub fn influencer_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(super::reports::influencer_dashboard))
        .route("/sold-products", get(super::reports::influencer_sold_products))
        .route("/earnings", get(earnings_and_withdrawals))
        .route("/withdrawals", post(request_withdrawal))
}

/// Admin review, mounted under `/admin/withdrawals`
pub fn admin_withdrawals_routes() -> Router<AppState> {
    Router::new().route("/:id/review", post(review_withdrawal))
}

#[derive(Debug, Serialize)]
pub struct EarningsOverview {
    pub earnings: InfluencerEarnings,
    pub withdrawals: WithdrawalHistory,
}

async fn earnings_and_withdrawals(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_influencer()?;
    let earnings = state
        .services
        .commission
        .influencer_earnings(ctx.user_id)
        .await?;
    let withdrawals = state.services.withdrawals.influencer_withdrawals(&ctx).await?;

    Ok(success_response(EarningsOverview {
        earnings,
        withdrawals,
    }))
}

async fn request_withdrawal(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<RequestWithdrawalInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state
        .services
        .withdrawals
        .request_withdrawal(&ctx, payload)
        .await?;
    Ok(created_response(request))
}

async fn review_withdrawal(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<ReviewWithdrawalInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = state
        .services
        .withdrawals
        .review_withdrawal(&ctx, request_id, payload)
        .await?;
    Ok(success_response(request))
}
