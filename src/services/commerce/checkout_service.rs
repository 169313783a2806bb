pub use crate::entities::checkout_session::CheckoutMode;

use crate::{
    config::AppConfig,
    context::RequestContext,
    entities::checkout_session,
    errors::ServiceError,
    events::{Event, EventSender},
    payment_gateway::PaymentGateway,
    services::commerce::{cart_service::CartService, catalog::CatalogService},
    services::pricing::CheckoutTotals,
    session::{BuyNowSlot, BuyNowStore},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// Everything the browser needs to open the gateway's payment widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub gateway_order_id: String,
    pub gateway_key_id: String,
    pub currency: String,
    pub receipt: String,
    pub mode: CheckoutMode,
    pub lines: Vec<CheckoutLine>,
    pub totals: CheckoutTotals,
}

/// Checkout orchestrator.
///
/// Prices the pending purchase and opens a gateway order for the grand
/// total. The only row written is the checkout session binding that gateway
/// order to the caller; stock and the order ledger are only touched once the
/// payment is confirmed.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    buy_now: BuyNowStore,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        buy_now: BuyNowStore,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            gateway,
            buy_now,
            event_sender,
            config,
        }
    }

    /// Stages a single product for express checkout in the caller's session.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn stage_buy_now(
        &self,
        ctx: &RequestContext,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<BuyNowSlot, ServiceError> {
        let session_id = ctx.session_id()?;
        CatalogService::find_product(&*self.db, product_id).await?;

        let slot = self
            .buy_now
            .stage(session_id, ctx.user_id, product_id, quantity);
        info!("Staged buy-now product {} x{}", product_id, slot.quantity);
        Ok(slot)
    }

    /// Drops the session's buy-now slot. Returns whether one was staged.
    pub fn cancel_buy_now(&self, ctx: &RequestContext) -> Result<bool, ServiceError> {
        Ok(self.buy_now.clear(ctx.session_id()?))
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn start_checkout(
        &self,
        ctx: &RequestContext,
    ) -> Result<CheckoutSession, ServiceError> {
        let (mode, lines) = self.pending_lines(ctx).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();
        let totals =
            CheckoutTotals::compute(subtotal, self.config.tax_rate, self.config.service_fee)?;

        let receipt = format!("rcpt_{}", Uuid::new_v4().simple());
        let gateway_order = self
            .gateway
            .create_order(
                totals.amount_minor_units,
                &self.config.currency,
                true,
                &receipt,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, amount = totals.amount_minor_units, "Gateway order creation failed");
                e
            })?;

        checkout_session::ActiveModel {
            gateway_order_id: Set(gateway_order.id.clone()),
            user_id: Set(ctx.user_id),
            mode: Set(mode),
            amount_minor_units: Set(totals.amount_minor_units),
            currency: Set(self.config.currency.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                user_id: ctx.user_id,
                gateway_order_id: gateway_order.id.clone(),
                amount_minor_units: totals.amount_minor_units,
            })
            .await;

        info!(
            gateway_order_id = %gateway_order.id,
            grand_total = %totals.grand_total,
            "Checkout started"
        );

        Ok(CheckoutSession {
            gateway_order_id: gateway_order.id,
            gateway_key_id: self.gateway.key_id().to_string(),
            currency: self.config.currency.clone(),
            receipt,
            mode,
            lines,
            totals,
        })
    }

    /// The checkout session opened for `gateway_order_id`, if this service issued it.
    pub async fn session_for<C: ConnectionTrait>(
        conn: &C,
        gateway_order_id: &str,
    ) -> Result<Option<checkout_session::Model>, ServiceError> {
        Ok(checkout_session::Entity::find_by_id(gateway_order_id.to_string())
            .one(conn)
            .await?)
    }

    /// A staged buy-now item takes precedence over the cart.
    async fn pending_lines(
        &self,
        ctx: &RequestContext,
    ) -> Result<(CheckoutMode, Vec<CheckoutLine>), ServiceError> {
        let staged = ctx
            .session_id
            .as_deref()
            .and_then(|session_id| self.buy_now.get(session_id, ctx.user_id));

        if let Some(slot) = staged {
            let product = CatalogService::find_product(&*self.db, slot.product_id).await?;
            let line = CheckoutLine {
                product_id: product.id,
                unit_price: product.price,
                quantity: slot.quantity,
                line_total: product.price * Decimal::from(slot.quantity),
                name: product.name,
            };
            return Ok((CheckoutMode::BuyNow, vec![line]));
        }

        let lines = CartService::lines_for(&*self.db, ctx.user_id)
            .await?
            .into_iter()
            .map(|(item, product)| CheckoutLine {
                product_id: product.id,
                unit_price: product.price,
                quantity: item.quantity,
                line_total: product.price * Decimal::from(item.quantity),
                name: product.name,
            })
            .collect();
        Ok((CheckoutMode::Cart, lines))
    }
}
