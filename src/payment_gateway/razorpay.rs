use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, instrument};

use super::{GatewayOrder, PaymentGateway};
use crate::config::AppConfig;
use crate::errors::ServiceError;

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

/// Razorpay orders API client
#[derive(Clone)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RazorpayGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            config.gateway_base_url.clone(),
            config.gateway_key_id.clone(),
            config.gateway_key_secret.clone(),
            Duration::from_secs(config.gateway_timeout_secs),
        )
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self))]
    async fn create_order(
        &self,
        amount_minor_units: i64,
        currency: &str,
        auto_capture: bool,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let url = format!("{}/v1/orders", self.base_url);
        let body = CreateOrderBody {
            amount: amount_minor_units,
            currency,
            receipt,
            payment_capture: u8::from(auto_capture),
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "timed out" } else { "unreachable" };
                error!(error = %e, "Payment gateway {}", reason);
                ServiceError::PaymentGateway(format!("gateway {}", reason))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(status = %status, body = %detail, "Payment gateway rejected order creation");
            return Err(ServiceError::PaymentGateway(format!(
                "gateway responded with {}",
                status
            )));
        }

        let order: GatewayOrder = response.json().await.map_err(|e| {
            error!(error = %e, "Payment gateway returned an unreadable order");
            ServiceError::PaymentGateway("malformed gateway response".to_string())
        })?;

        info!(gateway_order_id = %order.id, amount = order.amount, "Gateway order created");
        Ok(order)
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        super::verify_signature(&self.key_secret, order_id, payment_id, signature)
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }
}
