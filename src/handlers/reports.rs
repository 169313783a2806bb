use axum::{extract::State, response::IntoResponse, routing::get, Router};
use chrono::Utc;

use crate::context::RequestContext;
use crate::handlers::common::success_response;
use crate::{errors::ServiceError, AppState};

/// Admin reporting, mounted under `/admin`
pub fn admin_reports_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(admin_dashboard))
        .route("/reports/product-sales", get(product_sales_report))
}

async fn admin_dashboard(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    let dashboard = state.services.reports.admin_dashboard(Utc::now()).await?;
    Ok(success_response(dashboard))
}

async fn product_sales_report(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_admin()?;
    let report = state.services.reports.product_sales_report().await?;
    Ok(success_response(report))
}

/// The caller's own sales dashboard
pub(crate) async fn influencer_dashboard(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_influencer()?;
    let dashboard = state
        .services
        .reports
        .influencer_dashboard(ctx.user_id, Utc::now())
        .await?;
    Ok(success_response(dashboard))
}

/// Completed sales of the caller's products
pub(crate) async fn influencer_sold_products(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_influencer()?;
    let report = state
        .services
        .reports
        .sold_products(ctx.user_id, Utc::now())
        .await?;
    Ok(success_response(report))
}
