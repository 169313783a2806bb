pub mod commerce;
pub mod common;
pub mod orders;
pub mod payments;
pub mod reports;
pub mod withdrawals;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::payment_gateway::PaymentGateway;
use crate::services::{
    commerce::{CartService, CatalogService, CheckoutService, PaymentConfirmationService},
    commission::CommissionService,
    orders::OrderService,
    reports::ReportService,
    withdrawals::WithdrawalService,
};
use crate::session::BuyNowStore;
use std::sync::Arc;
use std::time::Duration;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub payments: Arc<PaymentConfirmationService>,
    pub orders: Arc<OrderService>,
    pub commission: Arc<CommissionService>,
    pub reports: Arc<ReportService>,
    pub withdrawals: Arc<WithdrawalService>,
}

impl AppServices {
    /// Wires every service against one pool, gateway and buy-now store.
    ///
    /// Checkout and confirmation must share the same [`BuyNowStore`] so a slot
    /// staged by one is visible to (and cleared by) the other.
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let buy_now = BuyNowStore::new(Duration::from_secs(config.buy_now_ttl_secs));

        let checkout = Arc::new(CheckoutService::new(
            db_pool.clone(),
            gateway.clone(),
            buy_now.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let payments = Arc::new(PaymentConfirmationService::new(
            db_pool.clone(),
            gateway,
            buy_now,
            event_sender.clone(),
            config,
        ));

        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            checkout,
            payments,
            orders: Arc::new(OrderService::new(db_pool.clone(), event_sender.clone())),
            commission: Arc::new(CommissionService::new(db_pool.clone())),
            reports: Arc::new(ReportService::new(db_pool.clone())),
            withdrawals: Arc::new(WithdrawalService::new(db_pool, event_sender)),
        }
    }
}
