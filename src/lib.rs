//! LumosKart API Library
//!
//! Order settlement backend for an influencer marketplace: catalog, cart,
//! checkout against a payment gateway, payment confirmation into the order
//! ledger, commission accounting and influencer payouts.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod context;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod payment_gateway;
pub mod services;
pub mod session;
pub mod tracing;

use axum::{extract::State, middleware, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::payment_gateway::PaymentGateway;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<config::AppConfig>,
        event_sender: Arc<events::EventSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let services =
            handlers::AppServices::new(db.clone(), gateway, event_sender.clone(), config.clone());
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

/// Response envelope shared by every successful endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every `/api/v1` route.
pub fn api_v1_routes() -> Router<AppState> {
    let admin = Router::new()
        .nest("/orders", handlers::orders::admin_orders_routes())
        .nest("/withdrawals", handlers::withdrawals::admin_withdrawals_routes())
        .merge(handlers::reports::admin_reports_routes());

    Router::new()
        .route("/status", get(api_status))
        .nest("/products", handlers::commerce::products_routes())
        .nest("/cart", handlers::commerce::carts_routes())
        .nest("/checkout", handlers::commerce::checkout_routes())
        .nest("/payments", handlers::payments::payments_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/influencer", handlers::withdrawals::influencer_routes())
        .nest("/admin", admin)
}

/// Full application router with request-id propagation; outer layers
/// (CORS, timeouts, compression) are added by the binary.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(middleware::from_fn(crate::tracing::request_id_middleware))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "lumoskart-api",
        "environment": state.config.environment,
        "currency": state.config.currency,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
