use crate::{entities::product, errors::ServiceError};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Catalog store consumed by checkout and settlement.
///
/// Product records are owned by influencers and managed elsewhere; this
/// service exposes the reads the core needs plus the one guarded write
/// (stock decrement) that settlement performs.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductInput {
    pub influencer_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "Product name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_positive_price")]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}

fn validate_positive_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    Ok(())
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let product_id = Uuid::new_v4();
        let product = product::ActiveModel {
            id: Set(product_id),
            influencer_id: Set(input.influencer_id),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            price: Set(input.price),
            stock: Set(input.stock),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        let product = product.insert(&*self.db).await?;
        info!("Created product: {}", product_id);
        Ok(product)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Self::find_product(&*self.db, product_id).await
    }

    pub async fn list_products(
        &self,
        influencer_id: Option<Uuid>,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = product::Entity::find().order_by_asc(product::Column::Name);
        if let Some(influencer_id) = influencer_id {
            query = query.filter(product::Column::InfluencerId.eq(influencer_id));
        }
        Ok(query.all(&*self.db).await?)
    }

    pub async fn find_product<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Guarded stock decrement: `stock = stock - qty` only where `stock >= qty`.
    ///
    /// Runs on the caller's connection so it joins the settlement transaction.
    /// Returns the product as it stands after the decrement.
    #[instrument(skip(conn))]
    pub async fn decrement_stock<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<product::Model, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "quantity must be at least 1, got {}",
                quantity
            )));
        }

        let result = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        let product = Self::find_product(conn, product_id).await?;

        if result.rows_affected == 0 {
            warn!(
                product_id = %product_id,
                requested = quantity,
                available = product.stock,
                "Stock reservation rejected"
            );
            return Err(ServiceError::insufficient_stock(
                product_id,
                format!(
                    "Not enough stock for {}. Available: {}, Requested: {}",
                    product.name, product.stock, quantity
                ),
            ));
        }

        Ok(product)
    }
}
