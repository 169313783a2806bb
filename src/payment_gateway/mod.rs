//! Payment gateway seam.
//!
//! The rest of the crate only sees [`PaymentGateway`]; the concrete client is
//! chosen once at startup and injected as `Arc<dyn PaymentGateway>`.

mod razorpay;

pub use razorpay::RazorpayGateway;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Gateway-side order created ahead of payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a gateway order for `amount_minor_units`. Never retried internally.
    async fn create_order(
        &self,
        amount_minor_units: i64,
        currency: &str,
        auto_capture: bool,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError>;

    /// Checks the callback signature for an order/payment pair.
    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    /// Public key id handed to the browser checkout widget.
    fn key_id(&self) -> &str;
}

/// Hex HMAC-SHA256 over `"{order_id}|{payment_id}"`.
pub fn compute_signature(secret: &str, order_id: &str, payment_id: &str) -> String {
    signing_mac(secret, order_id, payment_id)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Constant-time check of a hex signature. Malformed hex never matches.
pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    signing_mac(secret, order_id, payment_id)
        .map(|mac| mac.verify_slice(&expected).is_ok())
        .unwrap_or(false)
}

fn signing_mac(
    secret: &str,
    order_id: &str,
    payment_id: &str,
) -> Result<HmacSha256, hmac::digest::InvalidLength> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Ok(mac)
}
