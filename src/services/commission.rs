//! Commission / earnings calculator.
//!
//! Read-only over the order ledger: only lines of `Completed` orders count.
//! Every figure is summed in `Decimal` from the stored line prices and the
//! order's commission percentage, so re-running against an unchanged ledger
//! yields identical results.

use crate::{
    entities::{
        order::{self, OrderStatus},
        order_item, product,
    },
    errors::ServiceError,
    services::pricing,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType,
    QueryFilter, QuerySelect, RelationTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// One order line of a completed order, with what reporting needs alongside it.
#[derive(Debug, Clone, PartialEq, FromQueryResult)]
pub struct SettledLine {
    pub order_id: Uuid,
    /// Buyer of the order
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub influencer_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub commission_percentage: Decimal,
    pub ordered_at: DateTime<Utc>,
}

impl SettledLine {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// `(platform commission, influencer earnings)`, unrounded
    pub fn split(&self) -> (Decimal, Decimal) {
        pricing::split_line(self.line_total(), self.commission_percentage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluencerEarnings {
    pub influencer_id: Uuid,
    pub gross_sales: Decimal,
    pub earnings: Decimal,
    pub commission: Decimal,
    pub orders_count: u64,
}

impl InfluencerEarnings {
    pub fn from_lines<'a>(influencer_id: Uuid, lines: impl IntoIterator<Item = &'a SettledLine>) -> Self {
        let mut gross_sales = Decimal::ZERO;
        let mut commission = Decimal::ZERO;
        let mut earnings = Decimal::ZERO;
        let mut orders = HashSet::new();

        for line in lines.into_iter().filter(|l| l.influencer_id == influencer_id) {
            let (cut, share) = line.split();
            gross_sales += line.line_total();
            commission += cut;
            earnings += share;
            orders.insert(line.order_id);
        }

        Self {
            influencer_id,
            gross_sales: pricing::round_money(gross_sales),
            earnings: pricing::round_money(earnings),
            commission: pricing::round_money(commission),
            orders_count: orders.len() as u64,
        }
    }
}

#[derive(Clone)]
pub struct CommissionService {
    db: Arc<DatabaseConnection>,
}

impl CommissionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn influencer_earnings(
        &self,
        influencer_id: Uuid,
    ) -> Result<InfluencerEarnings, ServiceError> {
        let lines = settled_lines(&*self.db, Some(influencer_id)).await?;
        Ok(InfluencerEarnings::from_lines(influencer_id, &lines))
    }

    /// Platform cut across every completed order line.
    #[instrument(skip(self))]
    pub async fn platform_commission(&self) -> Result<Decimal, ServiceError> {
        let lines = settled_lines(&*self.db, None).await?;
        let total: Decimal = lines.iter().map(|line| line.split().0).sum();
        Ok(pricing::round_money(total))
    }
}

/// Lines of completed orders, optionally narrowed to one influencer's products.
pub async fn settled_lines<C: ConnectionTrait>(
    conn: &C,
    influencer_id: Option<Uuid>,
) -> Result<Vec<SettledLine>, ServiceError> {
    let mut query = order_item::Entity::find()
        .select_only()
        .column(order_item::Column::OrderId)
        .column(order_item::Column::ProductId)
        .column(order_item::Column::Quantity)
        .column(order_item::Column::Price)
        .column_as(order::Column::UserId, "customer_id")
        .column_as(product::Column::Name, "product_name")
        .column_as(product::Column::InfluencerId, "influencer_id")
        .column_as(order::Column::CommissionPercentage, "commission_percentage")
        .column_as(order::Column::CreatedAt, "ordered_at")
        .join(JoinType::InnerJoin, order_item::Relation::Order.def())
        .join(JoinType::InnerJoin, order_item::Relation::Product.def())
        .filter(order::Column::Status.eq(OrderStatus::Completed));

    if let Some(influencer_id) = influencer_id {
        query = query.filter(product::Column::InfluencerId.eq(influencer_id));
    }

    Ok(query.into_model::<SettledLine>().all(conn).await?)
}
