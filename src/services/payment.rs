use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha512};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::{config::AppConfig, entities::PaymentMethod, errors::ServiceError};

/// Charge creation request sent to the gateway at checkout.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Order id; doubles as the gateway's external order reference.
    pub order_id: Uuid,
    pub gross_amount: Decimal,
    pub method: PaymentMethod,
}

/// Gateway handle stored on the order.
#[derive(Debug, Clone)]
pub struct ChargeResponse {
    pub reference: String,
}

/// Seam to the external payment gateway. Checkout calls this inside its
/// transaction so a gateway failure aborts the whole attempt.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct ChargeApiResponse {
    transaction_id: String,
}

/// Midtrans-style charge API client.
#[derive(Clone)]
pub struct MidtransGateway {
    client: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl MidtransGateway {
    pub fn new(base_url: String, server_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            server_key,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.payment_base_url.clone(),
            config.payment_server_key.clone().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl PaymentProvider for MidtransGateway {
    #[instrument(skip(self))]
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse, ServiceError> {
        // IDR has no fractional unit on the wire.
        let amount = request.gross_amount.trunc().to_i64().ok_or_else(|| {
            ServiceError::PaymentGatewayError("charge amount out of range".to_string())
        })?;

        let body = match request.method {
            PaymentMethod::Qris => json!({
                "payment_type": "qris",
                "transaction_details": {
                    "order_id": request.order_id.to_string(),
                    "gross_amount": amount,
                },
            }),
            PaymentMethod::BcaVa => json!({
                "payment_type": "bank_transfer",
                "transaction_details": {
                    "order_id": request.order_id.to_string(),
                    "gross_amount": amount,
                },
                "bank_transfer": { "bank": "bca" },
            }),
        };

        let response = self
            .client
            .post(format!("{}/charge", self.base_url))
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentGatewayError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::PaymentGatewayError(format!(
                "charge request rejected with {}",
                response.status()
            )));
        }

        let parsed: ChargeApiResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::PaymentGatewayError(e.to_string()))?;

        Ok(ChargeResponse {
            reference: parsed.transaction_id,
        })
    }
}

/// Verifies the gateway's webhook signature:
/// sha512(order_id + status_code + gross_amount + server_key), hex-encoded.
pub fn verify_webhook_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
    signature: &str,
) -> bool {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    let expected = hex::encode(hasher.finalize());
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(order_id.as_bytes());
        hasher.update(status_code.as_bytes());
        hasher.update(gross_amount.as_bytes());
        hasher.update(server_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    #[test]
    fn accepts_valid_signature() {
        let sig = sign("order-1", "200", "107000.00", "server-key");
        assert!(verify_webhook_signature(
            "order-1",
            "200",
            "107000.00",
            "server-key",
            &sig
        ));
    }

    #[test]
    fn rejects_tampered_amount() {
        let sig = sign("order-1", "200", "107000.00", "server-key");
        assert!(!verify_webhook_signature(
            "order-1",
            "200",
            "1.00",
            "server-key",
            &sig
        ));
    }

    #[test]
    fn rejects_wrong_key_and_length_mismatch() {
        let sig = sign("order-1", "200", "107000.00", "server-key");
        assert!(!verify_webhook_signature(
            "order-1",
            "200",
            "107000.00",
            "other-key",
            &sig
        ));
        assert!(!verify_webhook_signature(
            "order-1",
            "200",
            "107000.00",
            "server-key",
            "deadbeef"
        ));
    }
}
