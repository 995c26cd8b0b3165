use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

use crate::{config::AppConfig, errors::ServiceError};

/// Couriers the rate API is queried for.
pub const SUPPORTED_COURIERS: [&str; 2] = ["jne", "tiki"];

pub fn is_supported_courier(courier: &str) -> bool {
    SUPPORTED_COURIERS.contains(&courier)
}

/// One shipping service tier offered for a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOption {
    pub service: String,
    pub description: String,
    pub eta: String,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    #[serde(default)]
    data: Vec<RateEntry>,
}

#[derive(Debug, Deserialize)]
struct RateEntry {
    service: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    etd: String,
    cost: Decimal,
}

/// Client for the domestic shipping-rate API.
///
/// Rate lookups are the only blocking I/O on the cart path, so every call
/// carries a bounded timeout and a small bounded retry count; exhaustion
/// surfaces as `ShippingUnavailable`, which the client retries by requesting
/// a new quote.
#[derive(Clone)]
pub struct ShippingGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retries: u32,
}

impl ShippingGateway {
    pub fn new(base_url: String, api_key: String, timeout: Duration, retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            api_key,
            retries,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.shipping_base_url.clone(),
            config.shipping_api_key.clone(),
            Duration::from_secs(config.shipping_timeout_secs),
            config.shipping_retries,
        )
    }

    /// Quotes available service tiers for a route and weight.
    ///
    /// An empty list is a valid response meaning no service covers the
    /// route; only transport or decode failures are errors.
    #[instrument(skip(self))]
    pub async fn quote(
        &self,
        origin: &str,
        destination: &str,
        weight_grams: i64,
        courier: &str,
    ) -> Result<Vec<ServiceOption>, ServiceError> {
        let mut last_error = String::new();

        for attempt in 0..=self.retries {
            match self
                .request_rates(origin, destination, weight_grams, courier)
                .await
            {
                Ok(options) => return Ok(options),
                Err(err) => {
                    warn!(attempt, "shipping rate lookup failed: {}", err);
                    last_error = err;
                    if attempt < self.retries {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                }
            }
        }

        Err(ServiceError::ShippingUnavailable(last_error))
    }

    async fn request_rates(
        &self,
        origin: &str,
        destination: &str,
        weight_grams: i64,
        courier: &str,
    ) -> Result<Vec<ServiceOption>, String> {
        let weight = weight_grams.to_string();
        let response = self
            .client
            .post(format!("{}/calculate/domestic-cost", self.base_url))
            .header("key", &self.api_key)
            .form(&[
                ("origin", origin),
                ("destination", destination),
                ("weight", weight.as_str()),
                ("courier", courier),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("rate API returned {}", response.status()));
        }

        let body: RateResponse = response.json().await.map_err(|e| e.to_string())?;

        Ok(body
            .data
            .into_iter()
            .map(|entry| ServiceOption {
                service: entry.service,
                description: entry.description,
                eta: entry.etd,
                price: entry.cost,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: String) -> ShippingGateway {
        ShippingGateway::new(
            base_url,
            "test-key".to_string(),
            Duration::from_secs(2),
            2,
        )
    }

    #[test]
    fn courier_whitelist() {
        assert!(is_supported_courier("jne"));
        assert!(is_supported_courier("tiki"));
        assert!(!is_supported_courier("pigeon"));
    }

    #[tokio::test]
    async fn parses_service_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calculate/domestic-cost"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "name": "Jalur Nugraha Ekakurir (JNE)",
                        "service": "REG",
                        "description": "Layanan Reguler",
                        "etd": "2-3 day",
                        "cost": 15000
                    },
                    {
                        "name": "Jalur Nugraha Ekakurir (JNE)",
                        "service": "YES",
                        "description": "Yakin Esok Sampai",
                        "etd": "1 day",
                        "cost": 28000
                    }
                ]
            })))
            .mount(&server)
            .await;

        let options = gateway(server.uri())
            .quote("501", "114", 1200, "jne")
            .await
            .expect("quote should succeed");

        assert_eq!(options.len(), 2);
        assert_eq!(options[0].service, "REG");
        assert_eq!(options[0].price, dec!(15000));
        assert_eq!(options[1].eta, "1 day");
    }

    #[tokio::test]
    async fn empty_option_list_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calculate/domestic-cost"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let options = gateway(server.uri())
            .quote("501", "114", 500, "tiki")
            .await
            .expect("empty quote should succeed");
        assert!(options.is_empty());
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries_then_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calculate/domestic-cost"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // initial attempt + 2 retries
            .mount(&server)
            .await;

        let err = gateway(server.uri())
            .quote("501", "114", 500, "jne")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ShippingUnavailable(_)));
    }
}
