use crate::{
    config::AppConfig,
    context::RequestContext,
    db::with_transaction,
    entities::{
        order::{self, OrderStatus},
        order_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    payment_gateway::PaymentGateway,
    services::commerce::{
        cart_service::CartService,
        catalog::CatalogService,
        checkout_service::{CheckoutMode, CheckoutService},
    },
    services::pricing::{self, CheckoutTotals},
    session::BuyNowStore,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Gateway callback payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmPaymentInput {
    #[serde(default)]
    pub gateway_payment_id: String,
    #[serde(default)]
    pub gateway_order_id: String,
    #[serde(default)]
    pub signature: String,
    /// Must match the mode the checkout was opened in, when given
    #[serde(default)]
    pub mode: Option<CheckoutMode>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationOutcome {
    pub order_id: Uuid,
    pub total_amount: Decimal,
    /// True when this payment had already been settled by an earlier call
    pub replayed: bool,
}

impl ConfirmationOutcome {
    fn from_order(order: &order::Model, replayed: bool) -> Self {
        Self {
            order_id: order.id,
            total_amount: order.total_amount,
            replayed,
        }
    }
}

/// Payment confirmation handler.
///
/// Verifies the gateway signature and that the gateway order was opened by
/// this caller's checkout, then settles the payment in one transaction: the order row is inserted first (claiming the unique
/// `gateway_payment_id`), stock is decremented with a guarded update per
/// line, prices are snapshotted into order items, and the cart is cleared.
/// The recomputed charge must equal what checkout asked the gateway for.
/// Any failure rolls all of it back.
#[derive(Clone)]
pub struct PaymentConfirmationService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    buy_now: BuyNowStore,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

#[derive(Debug, Clone, Copy)]
enum LineSource {
    Cart,
    BuyNow { product_id: Uuid, quantity: i32 },
}

#[derive(Debug)]
struct Settlement {
    user_id: Uuid,
    address: Option<String>,
    commission_percentage: Decimal,
    tax_rate: Decimal,
    service_fee: Decimal,
    gateway_order_id: String,
    gateway_payment_id: String,
    /// What the gateway was asked to charge when checkout opened
    charged_minor_units: i64,
    source: LineSource,
}

impl Settlement {
    async fn apply(self, txn: &DatabaseTransaction) -> Result<order::Model, ServiceError> {
        let now = Utc::now();

        // First statement is a write: it takes the write lock and claims the payment id
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(self.user_id),
            address: Set(self.address),
            total_amount: Set(Decimal::ZERO),
            commission_percentage: Set(self.commission_percentage),
            commission_amount: Set(Decimal::ZERO),
            status: Set(OrderStatus::Pending),
            gateway_order_id: Set(Some(self.gateway_order_id)),
            gateway_payment_id: Set(Some(self.gateway_payment_id.clone())),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await
        .map_err(|e| claim_error(e, &self.gateway_payment_id))?;

        let mut lines = match self.source {
            LineSource::Cart => CartService::lines_for(txn, self.user_id)
                .await?
                .into_iter()
                .map(|(item, _)| (item.product_id, item.quantity))
                .collect::<Vec<_>>(),
            LineSource::BuyNow {
                product_id,
                quantity,
            } => vec![(product_id, quantity)],
        };
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        // Stable row order across concurrent settlements
        lines.sort_by_key(|(product_id, _)| *product_id);

        let mut total = Decimal::ZERO;
        for (product_id, quantity) in lines {
            let product = CatalogService::decrement_stock(txn, product_id, quantity).await?;

            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(product.id),
                quantity: Set(quantity),
                price: Set(product.price),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;

            total += product.price * Decimal::from(quantity);
        }

        let due = CheckoutTotals::compute(total, self.tax_rate, self.service_fee)?;
        if due.amount_minor_units != self.charged_minor_units {
            return Err(ServiceError::PaymentMismatch(format!(
                "checkout charged {} minor units but the settled lines come to {}",
                self.charged_minor_units, due.amount_minor_units
            )));
        }

        let percentage = order.commission_percentage;
        let mut order: order::ActiveModel = order.into();
        order.total_amount = Set(total);
        order.commission_amount = Set(pricing::commission_amount(total, percentage));
        order.status = Set(OrderStatus::Completed);
        order.updated_at = Set(Utc::now());
        let order = order.update(txn).await?;

        if matches!(self.source, LineSource::Cart) {
            CartService::clear(txn, self.user_id).await?;
        }

        Ok(order)
    }
}

fn claim_error(err: DbErr, gateway_payment_id: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(format!(
            "Payment {} already settled",
            gateway_payment_id
        )),
        _ => ServiceError::DatabaseError(err),
    }
}

impl PaymentConfirmationService {
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

    #[instrument(
        skip(self, ctx, input),
        fields(user_id = %ctx.user_id, gateway_payment_id = %input.gateway_payment_id)
    )]
    pub async fn confirm(
        &self,
        ctx: &RequestContext,
        input: ConfirmPaymentInput,
    ) -> Result<ConfirmationOutcome, ServiceError> {
        let payment_id = input.gateway_payment_id.trim();
        let gateway_order_id = input.gateway_order_id.trim();
        let signature = input.signature.trim();

        let missing: Vec<&str> = [
            ("gateway_payment_id", payment_id),
            ("gateway_order_id", gateway_order_id),
            ("signature", signature),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(ServiceError::MissingParameters(missing.join(", ")));
        }

        if !self
            .gateway
            .verify_signature(gateway_order_id, payment_id, signature)
        {
            warn!(
                security_event = true,
                user_id = %ctx.user_id,
                gateway_order_id = %gateway_order_id,
                gateway_payment_id = %payment_id,
                "Payment signature verification failed"
            );
            self.reject(ctx, payment_id, "signature mismatch").await;
            return Err(ServiceError::SignatureVerification);
        }

        let binding = CheckoutService::session_for(&*self.db, gateway_order_id)
            .await?
            .filter(|session| session.user_id == ctx.user_id);
        let Some(binding) = binding else {
            warn!(
                security_event = true,
                user_id = %ctx.user_id,
                gateway_order_id = %gateway_order_id,
                "Confirmation for a gateway order not opened by this caller"
            );
            self.reject(ctx, payment_id, "unknown gateway order").await;
            return Err(ServiceError::SignatureVerification);
        };

        let mode = binding.mode;
        if input.mode.is_some_and(|requested| requested != mode) {
            return Err(ServiceError::PaymentMismatch(format!(
                "gateway order {} was opened for {:?} checkout",
                gateway_order_id, mode
            )));
        }

        if let Some(existing) = self.find_settled(payment_id).await? {
            info!(order_id = %existing.id, "Payment already settled; returning existing order");
            return Self::replayed(ctx, &existing);
        }

        let source = match mode {
            CheckoutMode::Cart => LineSource::Cart,
            CheckoutMode::BuyNow => {
                let session_id = ctx.session_id()?;
                let slot = self
                    .buy_now
                    .get(session_id, ctx.user_id)
                    .ok_or(ServiceError::EmptyCart)?;
                LineSource::BuyNow {
                    product_id: slot.product_id,
                    quantity: slot.quantity,
                }
            }
        };

        let settlement = Settlement {
            user_id: ctx.user_id,
            address: input
                .address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            commission_percentage: self.config.default_commission_percentage,
            tax_rate: self.config.tax_rate,
            service_fee: self.config.service_fee,
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: payment_id.to_string(),
            charged_minor_units: binding.amount_minor_units,
            source,
        };

        let result = with_transaction(&self.db, move |txn| Box::pin(settlement.apply(txn))).await;

        match result {
            Ok(order) => {
                if mode == CheckoutMode::BuyNow {
                    if let Some(session_id) = ctx.session_id.as_deref() {
                        self.buy_now.clear(session_id);
                    }
                }

                self.event_sender
                    .send_or_log(Event::OrderCompleted {
                        order_id: order.id,
                        user_id: order.user_id,
                        total_amount: order.total_amount,
                        commission_amount: order.commission_amount,
                    })
                    .await;

                info!(
                    order_id = %order.id,
                    total_amount = %order.total_amount,
                    commission_amount = %order.commission_amount,
                    "Payment settled"
                );
                Ok(ConfirmationOutcome::from_order(&order, false))
            }
            Err(ServiceError::Conflict(reason)) => match self.find_settled(payment_id).await? {
                Some(existing) => {
                    info!(order_id = %existing.id, "Concurrent confirmation lost the claim; returning existing order");
                    Self::replayed(ctx, &existing)
                }
                None => Err(ServiceError::Conflict(reason)),
            },
            Err(err @ (ServiceError::InsufficientStock { .. } | ServiceError::PaymentMismatch(_))) => {
                self.reject(ctx, payment_id, &err.to_string()).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// A settled payment is only ever reported back to the user who paid it.
    fn replayed(
        ctx: &RequestContext,
        existing: &order::Model,
    ) -> Result<ConfirmationOutcome, ServiceError> {
        if existing.user_id != ctx.user_id {
            warn!(
                security_event = true,
                user_id = %ctx.user_id,
                order_id = %existing.id,
                "Replay of a payment settled for another user"
            );
            return Err(ServiceError::Conflict(
                "Payment already settled for a different order".to_string(),
            ));
        }
        Ok(ConfirmationOutcome::from_order(existing, true))
    }

    async fn find_settled(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::GatewayPaymentId.eq(gateway_payment_id))
            .one(&*self.db)
            .await?)
    }

    async fn reject(&self, ctx: &RequestContext, gateway_payment_id: &str, reason: &str) {
        self.event_sender
            .send_or_log(Event::PaymentRejected {
                user_id: ctx.user_id,
                gateway_payment_id: gateway_payment_id.to_string(),
                reason: reason.to_string(),
            })
            .await;
    }
}
