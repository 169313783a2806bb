use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response, validate_input};
use crate::{services::commerce::CreateProductInput, AppState};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
    pub influencer_id: Option<Uuid>,
}

/// Product as listed to a creator. The owning influencer is the caller.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state
        .services
        .catalog
        .list_products(query.influencer_id)
        .await?;
    Ok(success_response(products))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(success_response(product))
}

async fn create_product(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require_influencer()?;
    validate_input(&payload)?;

    let product = state
        .services
        .catalog
        .create_product(CreateProductInput {
            influencer_id: ctx.user_id,
            name: payload.name.trim().to_string(),
            description: payload
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            price: payload.price,
            stock: payload.stock,
        })
        .await?;

    Ok(created_response(product))
}
