use crate::{
    entities::{
        order::{self, OrderStatus},
        order_item, product,
        withdraw_request::{self, WithdrawStatus},
    },
    errors::ServiceError,
    services::{
        commission::{settled_lines, InfluencerEarnings, SettledLine},
        pricing,
    },
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

const TOP_N: usize = 5;
const TREND_MONTHS: usize = 12;

/// Service for the influencer and admin dashboards and sales reports.
///
/// Everything here is read-only and computed in `Decimal` from the ledger;
/// failures are returned to the caller rather than flattened into zeros.
#[derive(Clone)]
pub struct ReportService {
    db: Arc<DatabaseConnection>,
}

/// Units sold per product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSales {
    pub product_id: Uuid,
    pub product_name: String,
    pub influencer_id: Uuid,
    pub quantity_sold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluencerDashboard {
    pub influencer_id: Uuid,
    pub total_revenue: Decimal,
    pub total_orders: u64,
    pub monthly_revenue: Decimal,
    pub monthly_orders: u64,
    pub previous_month_revenue: Decimal,
    pub previous_month_orders: u64,
    /// Whole percentages, capped at 100
    pub total_revenue_change: Decimal,
    pub total_orders_change: Decimal,
    pub monthly_revenue_change: Decimal,
    pub monthly_orders_change: Decimal,
    pub top_products: Vec<ProductSales>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub completed: u64,
    pub shipped: u64,
    pub canceled: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`
    pub month: String,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminDashboard {
    pub total_revenue: Decimal,
    pub total_commission: Decimal,
    pub commission_percentage: Decimal,
    pub total_influencer_earnings: Decimal,
    pub orders: StatusCounts,
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub top_influencers: Vec<InfluencerEarnings>,
    pub top_products: Vec<ProductSales>,
    pub pending_withdrawals: Vec<withdraw_request::Model>,
}

/// One sold order line as the influencer sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldProductLine {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub line_total: Decimal,
    pub earnings: Decimal,
    pub ordered_at: DateTime<Utc>,
}

/// Revenue and influencer earnings over one reporting window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesWindow {
    pub revenue: Decimal,
    pub earnings: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldProductsReport {
    pub influencer_id: Uuid,
    /// Newest first
    pub lines: Vec<SoldProductLine>,
    /// `now`'s calendar day
    pub daily: SalesWindow,
    /// Since Monday of `now`'s week
    pub weekly: SalesWindow,
    /// `now`'s calendar month
    pub monthly: SalesWindow,
}

impl SoldProductsReport {
    /// Builds the report from completed lines. Earnings use each order's own
    /// commission percentage.
    pub fn from_lines(influencer_id: Uuid, lines: &[SettledLine], now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let this_month = month_of(now);

        let mut mine: Vec<&SettledLine> = lines
            .iter()
            .filter(|l| l.influencer_id == influencer_id)
            .collect();
        mine.sort_by(|a, b| {
            b.ordered_at
                .cmp(&a.ordered_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
                .then_with(|| a.product_name.cmp(&b.product_name))
        });

        let daily = sales_window(mine.iter().copied().filter(|l| l.ordered_at.date_naive() == today));
        let weekly = sales_window(
            mine.iter()
                .copied()
                .filter(|l| in_range(l.ordered_at.date_naive(), week_start, today)),
        );
        let monthly =
            sales_window(mine.iter().copied().filter(|l| month_of(l.ordered_at) == this_month));

        let lines = mine
            .iter()
            .map(|line| SoldProductLine {
                order_id: line.order_id,
                customer_id: line.customer_id,
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                price: line.price,
                line_total: pricing::round_money(line.line_total()),
                earnings: pricing::round_money(line.split().1),
                ordered_at: line.ordered_at,
            })
            .collect();

        Self {
            influencer_id,
            lines,
            daily,
            weekly,
            monthly,
        }
    }
}

impl ReportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn influencer_dashboard(
        &self,
        influencer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<InfluencerDashboard, ServiceError> {
        let lines = settled_lines(&*self.db, Some(influencer_id)).await?;

        let this_month = (now.year(), now.month());
        let last_month = previous_month(this_month);

        let (total_revenue, total_orders) = revenue_and_orders(lines.iter());
        let (monthly_revenue, monthly_orders) =
            revenue_and_orders(lines.iter().filter(|l| month_of(l.ordered_at) == this_month));
        let (previous_month_revenue, previous_month_orders) =
            revenue_and_orders(lines.iter().filter(|l| month_of(l.ordered_at) == last_month));

        let previous_orders = Decimal::from(previous_month_orders);

        Ok(InfluencerDashboard {
            influencer_id,
            total_revenue,
            total_orders,
            monthly_revenue,
            monthly_orders,
            previous_month_revenue,
            previous_month_orders,
            total_revenue_change: pricing::capped_change(total_revenue, previous_month_revenue),
            total_orders_change: pricing::capped_change(
                Decimal::from(total_orders),
                previous_orders,
            ),
            monthly_revenue_change: pricing::capped_change(
                monthly_revenue,
                previous_month_revenue,
            ),
            monthly_orders_change: pricing::capped_change(
                Decimal::from(monthly_orders),
                previous_orders,
            ),
            top_products: top_products(&lines),
        })
    }

    #[instrument(skip(self))]
    pub async fn admin_dashboard(&self, now: DateTime<Utc>) -> Result<AdminDashboard, ServiceError> {
        let completed = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .all(&*self.db)
            .await?;

        let total_revenue: Decimal = completed.iter().map(|o| o.total_amount).sum();
        let total_commission: Decimal = completed.iter().map(|o| o.commission_amount).sum();
        let commission_percentage = if total_revenue.is_zero() {
            Decimal::ZERO
        } else {
            pricing::round_money(total_commission / total_revenue * Decimal::ONE_HUNDRED)
        };

        let monthly_revenue = monthly_trend(&completed, now);
        let orders = self.status_counts().await?;

        let lines = settled_lines(&*self.db, None).await?;
        let mut influencers: Vec<InfluencerEarnings> = lines
            .iter()
            .map(|l| l.influencer_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|id| InfluencerEarnings::from_lines(id, &lines))
            .collect();
        influencers.sort_by(|a, b| {
            b.earnings
                .cmp(&a.earnings)
                .then(a.influencer_id.cmp(&b.influencer_id))
        });
        influencers.truncate(TOP_N);

        let pending_withdrawals = withdraw_request::Entity::find()
            .filter(withdraw_request::Column::Status.eq(WithdrawStatus::Pending))
            .order_by_desc(withdraw_request::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        info!(
            total_revenue = %total_revenue,
            completed_orders = completed.len(),
            "Admin dashboard computed"
        );

        Ok(AdminDashboard {
            total_revenue,
            total_commission,
            commission_percentage,
            total_influencer_earnings: total_revenue - total_commission,
            orders,
            monthly_revenue,
            top_influencers: influencers,
            top_products: top_products(&lines),
            pending_withdrawals,
        })
    }

    /// Completed lines of the influencer's products with day, week and month totals.
    #[instrument(skip(self))]
    pub async fn sold_products(
        &self,
        influencer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SoldProductsReport, ServiceError> {
        let lines = settled_lines(&*self.db, Some(influencer_id)).await?;
        Ok(SoldProductsReport::from_lines(influencer_id, &lines, now))
    }

    /// Every catalog product with the units it has sold across all orders.
    #[instrument(skip(self))]
    pub async fn product_sales_report(&self) -> Result<Vec<ProductSales>, ServiceError> {
        let products = product::Entity::find().all(&*self.db).await?;
        let sold: Vec<(Uuid, i32)> = order_item::Entity::find()
            .select_only()
            .column(order_item::Column::ProductId)
            .column(order_item::Column::Quantity)
            .into_tuple()
            .all(&*self.db)
            .await?;

        let mut quantities: HashMap<Uuid, i64> = HashMap::new();
        for (product_id, quantity) in sold {
            *quantities.entry(product_id).or_default() += i64::from(quantity);
        }

        let mut report: Vec<ProductSales> = products
            .into_iter()
            .map(|p| ProductSales {
                quantity_sold: quantities.get(&p.id).copied().unwrap_or(0),
                product_id: p.id,
                product_name: p.name,
                influencer_id: p.influencer_id,
            })
            .collect();
        sort_by_units(&mut report);
        Ok(report)
    }

    async fn status_counts(&self) -> Result<StatusCounts, ServiceError> {
        let statuses: Vec<OrderStatus> = order::Entity::find()
            .select_only()
            .column(order::Column::Status)
            .into_tuple()
            .all(&*self.db)
            .await?;

        let mut counts = StatusCounts::default();
        for status in statuses {
            match status {
                OrderStatus::Pending => counts.pending += 1,
                OrderStatus::Completed => counts.completed += 1,
                OrderStatus::Shipped => counts.shipped += 1,
                OrderStatus::Canceled => counts.canceled += 1,
            }
            counts.total += 1;
        }
        Ok(counts)
    }
}

fn sales_window<'a>(lines: impl Iterator<Item = &'a SettledLine>) -> SalesWindow {
    let mut revenue = Decimal::ZERO;
    let mut earnings = Decimal::ZERO;
    for line in lines {
        revenue += line.line_total();
        earnings += line.split().1;
    }
    SalesWindow {
        revenue: pricing::round_money(revenue),
        earnings: pricing::round_money(earnings),
    }
}

fn in_range(day: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    from <= day && day <= to
}

fn month_of(at: DateTime<Utc>) -> (i32, u32) {
    (at.year(), at.month())
}

fn previous_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn revenue_and_orders<'a>(lines: impl Iterator<Item = &'a SettledLine>) -> (Decimal, u64) {
    let mut revenue = Decimal::ZERO;
    let mut orders = HashSet::new();
    for line in lines {
        revenue += line.line_total();
        orders.insert(line.order_id);
    }
    (revenue, orders.len() as u64)
}

/// Last twelve calendar months ending with `now`'s month, oldest first.
fn monthly_trend(completed: &[order::Model], now: DateTime<Utc>) -> Vec<MonthlyRevenue> {
    let mut by_month: HashMap<(i32, u32), Decimal> = HashMap::new();
    for order in completed {
        *by_month.entry(month_of(order.created_at)).or_default() += order.total_amount;
    }

    let mut months = Vec::with_capacity(TREND_MONTHS);
    let mut cursor = month_of(now);
    for _ in 0..TREND_MONTHS {
        months.push(cursor);
        cursor = previous_month(cursor);
    }
    months.reverse();

    months
        .into_iter()
        .map(|(year, month)| MonthlyRevenue {
            month: format!("{:04}-{:02}", year, month),
            revenue: by_month.get(&(year, month)).copied().unwrap_or_default(),
        })
        .collect()
}

fn top_products(lines: &[SettledLine]) -> Vec<ProductSales> {
    let mut by_product: BTreeMap<Uuid, ProductSales> = BTreeMap::new();
    for line in lines {
        by_product
            .entry(line.product_id)
            .or_insert_with(|| ProductSales {
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                influencer_id: line.influencer_id,
                quantity_sold: 0,
            })
            .quantity_sold += i64::from(line.quantity);
    }

    let mut ranked: Vec<ProductSales> = by_product.into_values().collect();
    sort_by_units(&mut ranked);
    ranked.truncate(TOP_N);
    ranked
}

fn sort_by_units(rows: &mut [ProductSales]) {
    rows.sort_by(|a, b| {
        b.quantity_sold
            .cmp(&a.quantity_sold)
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
}
