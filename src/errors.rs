use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error envelope returned to clients.
///
/// Every error response carries a stable machine-readable `code` next to the
/// human-readable `message`; internal detail never leaks past this boundary.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Cart may only contain items from a single seller")]
    SellerMismatch,

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Voucher cannot be used: {0}")]
    VoucherIneligible(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("No courier has been selected")]
    CourierNotSelected,

    #[error("Shipping rates unavailable: {0}")]
    ShippingUnavailable(String),

    #[error("Insufficient coin balance")]
    InsufficientBalance,

    #[error("Payment gateway error: {0}")]
    PaymentGatewayError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::SellerMismatch
            | Self::VoucherIneligible(_)
            | Self::EmptyCart
            | Self::CourierNotSelected => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientStock(_) | Self::InsufficientBalance => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ShippingUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::PaymentGatewayError(_) => StatusCode::PAYMENT_REQUIRED,
        }
    }

    /// Stable machine-readable code carried in the response envelope.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::SellerMismatch => "seller_mismatch",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::VoucherIneligible(_) => "voucher_ineligible",
            Self::EmptyCart => "empty_cart",
            Self::CourierNotSelected => "courier_not_selected",
            Self::ShippingUnavailable(_) => "shipping_unavailable",
            Self::InsufficientBalance => "insufficient_balance",
            Self::PaymentGatewayError(_) => "payment_gateway_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            status: "error".to_string(),
            code: self.error_code().to_string(),
            message: self.response_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::EmptyCart.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::ShippingUnavailable("timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::Unauthorized("no token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn internal_detail_does_not_leak() {
        let err = ServiceError::InternalError("secret connection string".into());
        assert_eq!(err.response_message(), "Internal server error");

        let err = ServiceError::DatabaseError(sea_orm::error::DbErr::Custom(
            "table carts is on fire".into(),
        ));
        assert_eq!(err.response_message(), "Database error");
    }

    #[tokio::test]
    async fn response_envelope_carries_stable_code() {
        let response = ServiceError::SellerMismatch.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.status, "error");
        assert_eq!(payload.code, "seller_mismatch");
    }
}
