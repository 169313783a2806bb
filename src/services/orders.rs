use crate::{
    context::RequestContext,
    entities::{
        order::{self, OrderStatus},
        order_item, product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// Order ledger reads and administrative transitions.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummaryItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<OrderSummaryItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct OrderFilter {
    pub status: Option<String>,
    pub user_id: Option<Uuid>,
    /// Orders containing at least one of this influencer's products
    pub influencer_id: Option<Uuid>,
    /// Calendar day (UTC) the order was placed
    pub date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Page must be at least 1"))]
    pub page: Option<u64>,
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount", rename_all = "lowercase")]
pub enum RefundRequest {
    Full,
    Partial(Decimal),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub order: order::Model,
    pub refunded_amount: Decimal,
    pub full: bool,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Order with its lines. Only the owner (or an admin) can see it.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn order_summary(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
    ) -> Result<OrderSummary, ServiceError> {
        let order = self
            .find_order(order_id)
            .await?
            .filter(|order| ctx.is_admin() || order.user_id == ctx.user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let rows = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        let items = rows
            .into_iter()
            .map(|(item, product)| OrderSummaryItem {
                product_id: item.product_id,
                product_name: product.map(|p| p.name).unwrap_or_default(),
                quantity: item.quantity,
                price: item.price,
                line_total: item.line_total(),
            })
            .collect();

        Ok(OrderSummary { order, items })
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_orders(
        &self,
        ctx: &RequestContext,
        filter: OrderFilter,
    ) -> Result<OrderPage, ServiceError> {
        ctx.require_admin()?;
        filter.validate()?;

        let mut condition = Condition::all();

        if let Some(status) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            condition = condition.add(order::Column::Status.eq(parse_status(status)?));
        }
        if let Some(user_id) = filter.user_id {
            condition = condition.add(order::Column::UserId.eq(user_id));
        }
        if let Some(date) = filter.date {
            let midnight = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| ServiceError::ValidationError(format!("invalid date {}", date)))?;
            let start = Utc.from_utc_datetime(&midnight);
            condition = condition
                .add(order::Column::CreatedAt.gte(start))
                .add(order::Column::CreatedAt.lt(start + Duration::days(1)));
        }
        if let Some(influencer_id) = filter.influencer_id {
            let order_ids: Vec<Uuid> = order_item::Entity::find()
                .select_only()
                .column(order_item::Column::OrderId)
                .distinct()
                .inner_join(product::Entity)
                .filter(product::Column::InfluencerId.eq(influencer_id))
                .into_tuple()
                .all(&*self.db)
                .await?;
            condition = condition.add(order::Column::Id.is_in(order_ids));
        }

        let page = filter.page.unwrap_or(1);
        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

        let paginator = order::Entity::find()
            .filter(condition)
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderPage {
            orders,
            total,
            page,
            limit,
        })
    }

    /// Administrative status change. Financial fields are left untouched.
    #[instrument(skip(self, ctx), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        new_status: &str,
    ) -> Result<order::Model, ServiceError> {
        ctx.require_admin()?;
        let status = parse_status(new_status)?;

        let order = self.require_order(order_id).await?;
        let old_status = order.status;
        let version = order.version;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(status);
        active.version = Set(version + 1);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: status,
            })
            .await;

        info!("Order {} status changed from {} to {}", order_id, old_status, status);
        Ok(updated)
    }

    /// Records a refund. A full refund cancels the order; a partial one leaves
    /// the status as it is. Stock is not restored.
    #[instrument(skip(self, ctx), fields(order_id = %order_id))]
    pub async fn process_refund(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        request: RefundRequest,
    ) -> Result<RefundOutcome, ServiceError> {
        ctx.require_admin()?;
        let order = self.require_order(order_id).await?;

        if order.status == OrderStatus::Canceled {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is already canceled",
                order_id
            )));
        }

        let (order, refunded_amount, full) = match request {
            RefundRequest::Full => {
                let amount = order.total_amount;
                let version = order.version;
                let mut active: order::ActiveModel = order.into();
                active.status = Set(OrderStatus::Canceled);
                active.version = Set(version + 1);
                active.updated_at = Set(Utc::now());
                (active.update(&*self.db).await?, amount, true)
            }
            RefundRequest::Partial(amount) => {
                if amount <= Decimal::ZERO || amount > order.total_amount {
                    return Err(ServiceError::ValidationError(format!(
                        "Refund amount must be greater than 0 and at most {}",
                        order.total_amount
                    )));
                }
                (order, amount, false)
            }
        };

        self.event_sender
            .send_or_log(Event::OrderRefunded {
                order_id,
                amount: refunded_amount,
                full,
            })
            .await;

        info!(
            refunded_amount = %refunded_amount,
            full,
            "Refund processed"
        );
        Ok(RefundOutcome {
            order,
            refunded_amount,
            full,
        })
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(order::Entity::find_by_id(order_id).one(&*self.db).await?)
    }

    async fn require_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        self.find_order(order_id).await?.ok_or_else(|| {
            error!("Order {} not found", order_id);
            ServiceError::NotFound(format!("Order {} not found", order_id))
        })
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw.trim()).map_err(|_| {
        ServiceError::InvalidStatus(format!(
            "'{}' is not one of Pending, Completed, Shipped, Canceled",
            raw
        ))
    })
}
