use crate::{
    context::RequestContext,
    entities::{cart_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::catalog::CatalogService,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Per-user shopping cart.
///
/// Cart lines are ephemeral inputs to settlement: they are priced live from
/// the catalog for display, and deleted in the same transaction that turns
/// them into an order.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: Option<i32>,
}

/// Upper bound for a single cart line. Matches the `AddToCartInput` range.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

fn quantity_limit_error(current: i32, requested: i32) -> ServiceError {
    ServiceError::ValidationError(format!(
        "Cart line quantity cannot exceed {} (have {}, adding {})",
        MAX_LINE_QUANTITY, current, requested
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustAction {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub available_stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    /// Live estimate from current catalog prices; not authoritative
    pub total: Decimal,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn list(&self, ctx: &RequestContext) -> Result<CartView, ServiceError> {
        let items = Self::lines_for(&*self.db, ctx.user_id)
            .await?
            .into_iter()
            .map(|(item, product)| CartLine {
                item_id: item.id,
                product_id: product.id,
                name: product.name,
                unit_price: product.price,
                quantity: item.quantity,
                line_total: product.price * Decimal::from(item.quantity),
                available_stock: product.stock,
            })
            .collect::<Vec<_>>();

        let total = items.iter().map(|line| line.line_total).sum();
        Ok(CartView { items, total })
    }

    /// Get-or-create the (user, product) line, adding to its quantity if present.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn add(
        &self,
        ctx: &RequestContext,
        input: AddToCartInput,
    ) -> Result<cart_item::Model, ServiceError> {
        input.validate()?;
        let quantity = input.quantity.unwrap_or(1);

        // A racing first add for the same product loses on the unique index;
        // the retry then finds the winner's line and increments it.
        let item = match self.merge_line(ctx.user_id, input.product_id, quantity).await {
            Err(ServiceError::Conflict(reason)) => {
                warn!(product_id = %input.product_id, %reason, "Cart line created concurrently, retrying");
                self.merge_line(ctx.user_id, input.product_id, quantity)
                    .await?
            }
            other => other?,
        };

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id: ctx.user_id,
                product_id: input.product_id,
                quantity,
            })
            .await;

        info!("Added product {} to cart (qty now {})", input.product_id, item.quantity);
        Ok(item)
    }

    /// Increments the existing line or inserts a new one, in one transaction.
    ///
    /// The guarded increment is the first statement so the transaction takes
    /// the write lock before reading anything.
    async fn merge_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let incremented = cart_item::Entity::update_many()
            .col_expr(
                cart_item::Column::Quantity,
                Expr::col(cart_item::Column::Quantity).add(quantity),
            )
            .col_expr(cart_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .filter(cart_item::Column::Quantity.lte(MAX_LINE_QUANTITY - quantity))
            .exec(&txn)
            .await?
            .rows_affected;

        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let item = match existing {
            Some(item) if incremented > 0 => item,
            Some(item) => {
                return Err(quantity_limit_error(item.quantity, quantity));
            }
            None => {
                CatalogService::find_product(&txn, product_id).await?;
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(None),
                }
                .insert(&txn)
                .await
                .map_err(|e| match e.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(format!(
                        "Cart line for product {} already exists",
                        product_id
                    )),
                    _ => ServiceError::DatabaseError(e),
                })?
            }
        };

        txn.commit().await?;
        Ok(item)
    }

    /// Increase up to the line cap; decrease only while quantity > 1. Removal is separate.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn adjust(
        &self,
        ctx: &RequestContext,
        item_id: Uuid,
        action: AdjustAction,
    ) -> Result<cart_item::Model, ServiceError> {
        let item = self.owned_item(ctx, item_id).await?;

        let new_quantity = match action {
            AdjustAction::Increase => item
                .quantity
                .checked_add(1)
                .filter(|q| *q <= MAX_LINE_QUANTITY)
                .ok_or_else(|| quantity_limit_error(item.quantity, 1))?,
            AdjustAction::Decrease if item.quantity > 1 => item.quantity - 1,
            AdjustAction::Decrease => return Ok(item),
        };

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(new_quantity);
        item.updated_at = Set(Some(Utc::now()));
        Ok(item.update(&*self.db).await?)
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn remove(&self, ctx: &RequestContext, item_id: Uuid) -> Result<(), ServiceError> {
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::UserId.eq(ctx.user_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                item_id
            )));
        }

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                user_id: ctx.user_id,
                cart_item_id: item_id,
            })
            .await;
        Ok(())
    }

    pub async fn total(&self, ctx: &RequestContext) -> Result<Decimal, ServiceError> {
        Ok(self.list(ctx).await?.total)
    }

    /// Cart lines joined with their products, oldest first.
    pub async fn lines_for<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
    ) -> Result<Vec<(cart_item::Model, product::Model)>, ServiceError> {
        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(item, product)| product.map(|p| (item, p)))
            .collect())
    }

    /// Deletes every line in the user's cart. Returns the number removed.
    pub async fn clear<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn owned_item(
        &self,
        ctx: &RequestContext,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        cart_item::Entity::find_by_id(item_id)
            .filter(cart_item::Column::UserId.eq(ctx.user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))
    }
}
