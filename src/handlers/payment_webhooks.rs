use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::success_response,
    services::orders::{PaymentNotification, WebhookOutcome},
    services::payment::verify_webhook_signature,
    AppState,
};

/// Creates the router for the public payment-gateway callback.
pub fn payment_webhook_routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", post(payment_webhook))
}

/// Gateway notification payload. `signature_key` covers order id, status
/// code, and gross amount with the shared server key.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub status_code: String,
    #[serde(default)]
    pub gross_amount: String,
    #[serde(default)]
    pub signature_key: Option<String>,
}

/// Applies an asynchronous payment-status callback.
///
/// Unknown transaction statuses still answer 200 so the gateway does not
/// treat the delivery as failed and retry forever; they are logged and
/// change nothing.
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    if let Some(server_key) = &state.config.payment_server_key {
        let signature = payload.signature_key.as_deref().unwrap_or_default();
        let valid = verify_webhook_signature(
            &payload.order_id,
            &payload.status_code,
            &payload.gross_amount,
            server_key,
            signature,
        );
        if !valid {
            warn!(order_id = %payload.order_id, "webhook signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let order_id = Uuid::parse_str(&payload.order_id).map_err(|_| {
        ServiceError::ValidationError("order reference is not a valid id".to_string())
    })?;

    let outcome = state
        .services
        .orders
        .apply_payment_notification(PaymentNotification {
            order_id,
            transaction_status: payload.transaction_status,
        })
        .await?;

    let result = match outcome {
        WebhookOutcome::Applied => "applied",
        WebhookOutcome::AlreadyProcessed => "already_processed",
        WebhookOutcome::Ignored => "ignored",
    };

    Ok(success_response(json!({ "result": result })))
}
