use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort delivery. A closed or full channel is logged and ignored.
    pub async fn send_or_log(&self, event: Event) {
        let kind = event.kind();
        if let Err(e) = self.send(event).await {
            warn!(event = kind, error = %e, "Dropping domain event");
        }
    }
}

/// Domain events raised after a state change has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartItemAdded {
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        user_id: Uuid,
        cart_item_id: Uuid,
    },
    CheckoutStarted {
        user_id: Uuid,
        gateway_order_id: String,
        amount_minor_units: i64,
    },
    OrderCompleted {
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
        commission_amount: Decimal,
    },
    PaymentRejected {
        user_id: Uuid,
        gateway_payment_id: String,
        reason: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderRefunded {
        order_id: Uuid,
        amount: Decimal,
        full: bool,
    },
    WithdrawalRequested {
        request_id: Uuid,
        influencer_id: Uuid,
        amount: Decimal,
    },
    WithdrawalReviewed {
        request_id: Uuid,
        status: String,
        reviewed_at: DateTime<Utc>,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::CartItemAdded { .. } => "cart_item_added",
            Event::CartItemRemoved { .. } => "cart_item_removed",
            Event::CheckoutStarted { .. } => "checkout_started",
            Event::OrderCompleted { .. } => "order_completed",
            Event::PaymentRejected { .. } => "payment_rejected",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderRefunded { .. } => "order_refunded",
            Event::WithdrawalRequested { .. } => "withdrawal_requested",
            Event::WithdrawalReviewed { .. } => "withdrawal_reviewed",
        }
    }
}

// Drains the channel and records each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCompleted {
                order_id,
                total_amount,
                commission_amount,
                ..
            } => {
                info!(
                    event = event.kind(),
                    order_id = %order_id,
                    total_amount = %total_amount,
                    commission_amount = %commission_amount,
                    "Order settled"
                );
            }
            Event::PaymentRejected {
                gateway_payment_id,
                reason,
                ..
            } => {
                warn!(
                    event = event.kind(),
                    gateway_payment_id = %gateway_payment_id,
                    reason = %reason,
                    "Payment rejected"
                );
            }
            other => {
                info!(event = other.kind(), payload = ?other, "Domain event");
            }
        }
    }

    info!("Event processing loop stopped");
}
