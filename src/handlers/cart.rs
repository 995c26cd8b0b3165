use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedBuyer,
    entities::{PaymentMethod, VoucherKind, VoucherModel, VoucherValueType},
    errors::ServiceError,
    handlers::common::{success_response, validate_input},
    handlers::orders::{address_view, order_detail_view, AddressView},
    services::cart::{AddItemInput, CartDetail, UpdateItemInput, VariationChoice},
    services::shipping::{is_supported_courier, ServiceOption},
    AppState,
};

/// Creates the router for cart endpoints.
pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart).post(add_to_cart))
        .route("/items/:item_id", patch(update_cart_item).delete(remove_cart_item))
        .route("/vouchers", get(list_vouchers))
        .route("/apply-voucher", post(apply_voucher))
        .route("/remove-voucher", post(remove_voucher))
        .route("/update-address", post(update_address))
        .route("/shipping", get(get_shipping))
        .route("/shipping-fee", post(set_shipping_fee))
        .route("/toggle-coin", post(toggle_coin))
        .route("/checkout", post(checkout))
}

/// Current cart with items; totals are recomputed before the response.
async fn get_cart(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let detail = state.services.cart.detail(buyer.id).await?;
    Ok(success_response(cart_response(detail)))
}

/// Add an item to the cart.
async fn add_to_cart(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let input = AddItemInput {
        product_id: payload.product_id,
        quantity: payload.qty,
        note: payload.note,
        variations: payload.variations.map(into_variation_choices),
    };

    let detail = state.services.cart.add_item(buyer.id, input).await?;
    Ok(success_response(cart_response(detail)))
}

/// Update an item's quantity, note, or variations.
async fn update_cart_item(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let input = UpdateItemInput {
        quantity: payload.qty,
        note: payload.note,
        variations: payload.variations.map(into_variation_choices),
    };

    let detail = state
        .services
        .cart
        .update_item(buyer.id, item_id, input)
        .await?;
    Ok(success_response(cart_response(detail)))
}

/// Remove an item from the cart.
async fn remove_cart_item(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let detail = state.services.cart.remove_item(buyer.id, item_id).await?;
    Ok(success_response(cart_response(detail)))
}

/// Public active vouchers.
async fn list_vouchers(
    _buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let vouchers = state.services.vouchers.list_public_active().await?;
    let views: Vec<VoucherView> = vouchers.into_iter().map(voucher_view).collect();
    Ok(success_response(views))
}

/// Attach a voucher to the cart by code.
async fn apply_voucher(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ApplyVoucherRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let detail = state
        .services
        .cart
        .apply_voucher(buyer.id, &payload.voucher_code)
        .await?;
    Ok(success_response(cart_response(detail)))
}

/// Detach the cart's voucher.
async fn remove_voucher(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let detail = state.services.cart.remove_voucher(buyer.id).await?;
    Ok(success_response(cart_response(detail)))
}

/// Select one of the buyer's addresses for delivery.
async fn update_address(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateAddressRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let detail = state
        .services
        .cart
        .set_address(buyer.id, payload.address_id)
        .await?;
    Ok(success_response(cart_response(detail)))
}

/// Quote available shipping service tiers for the cart's route.
async fn get_shipping(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ShippingQuery>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    ensure_supported_courier(&query.courier)?;

    let ctx = state.services.cart.shipping_context(buyer.id).await?;
    let options = state
        .services
        .shipping
        .quote(&ctx.origin, &ctx.destination, ctx.weight_grams, &query.courier)
        .await?;

    Ok(success_response(options))
}

/// Lock in one quoted shipping service for the cart.
async fn set_shipping_fee(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ShippingFeeRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;
    ensure_supported_courier(&payload.courier)?;

    let ctx = state.services.cart.shipping_context(buyer.id).await?;
    let options = state
        .services
        .shipping
        .quote(&ctx.origin, &ctx.destination, ctx.weight_grams, &payload.courier)
        .await?;

    let option: &ServiceOption = options
        .iter()
        .find(|o| o.service == payload.service)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Shipping service {} not found", payload.service))
        })?;

    let detail = state
        .services
        .cart
        .set_shipping(buyer.id, &payload.courier, option)
        .await?;
    Ok(success_response(cart_response(detail)))
}

/// Toggle spending coin on this cart.
async fn toggle_coin(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ToggleCoinRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let detail = state
        .services
        .cart
        .toggle_coin(buyer.id, payload.use_coin)
        .await?;
    Ok(success_response(cart_response(detail)))
}

/// Convert the cart into an order and a payment request, atomically.
async fn checkout(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let method = parse_payment_method(&payload.payment_method)?;
    let detail = state.services.checkout.checkout(buyer.id, method).await?;
    Ok(success_response(order_detail_view(detail)))
}

fn ensure_supported_courier(courier: &str) -> Result<(), ServiceError> {
    if is_supported_courier(courier) {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "courier must be one of: {}",
            crate::services::shipping::SUPPORTED_COURIERS.join(", ")
        )))
    }
}

fn parse_payment_method(raw: &str) -> Result<PaymentMethod, ServiceError> {
    match raw {
        "qris" => Ok(PaymentMethod::Qris),
        "bca_va" => Ok(PaymentMethod::BcaVa),
        _ => Err(ServiceError::ValidationError(
            "payment method must be one of: qris, bca_va".to_string(),
        )),
    }
}

fn into_variation_choices(raw: Vec<VariationChoiceRequest>) -> Vec<VariationChoice> {
    raw.into_iter()
        .map(|v| VariationChoice {
            label: v.label,
            value: v.value,
        })
        .collect()
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct VariationChoiceRequest {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub qty: i32,
    pub note: Option<String>,
    pub variations: Option<Vec<VariationChoiceRequest>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(min = 1))]
    pub qty: i32,
    pub note: Option<String>,
    pub variations: Option<Vec<VariationChoiceRequest>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyVoucherRequest {
    #[validate(length(min = 1))]
    pub voucher_code: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAddressRequest {
    pub address_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ShippingQuery {
    pub courier: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ShippingFeeRequest {
    #[validate(length(min = 1))]
    pub courier: String,
    #[validate(length(min = 1))]
    pub service: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleCoinRequest {
    #[serde(rename = "use")]
    pub use_coin: bool,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: String,
}

// Response views

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: CartView,
    pub items: Vec<CartItemView>,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub address: Option<AddressView>,
    pub courier: Option<String>,
    pub courier_service: Option<String>,
    pub courier_eta: Option<String>,
    pub courier_price: Decimal,
    pub voucher_id: Option<Uuid>,
    pub voucher_discount: Decimal,
    pub voucher_cashback: Decimal,
    pub service_fee: Decimal,
    pub use_coin: bool,
    pub coin_applied: Decimal,
    pub total: Decimal,
    pub total_payment: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CartItemView {
    pub id: Uuid,
    pub product: ProductView,
    pub variations: Option<serde_json::Value>,
    pub quantity: i32,
    pub note: Option<String>,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ProductView {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub price_sale: Option<Decimal>,
    pub stock: i32,
}

#[derive(Debug, Serialize)]
pub struct VoucherView {
    pub code: String,
    pub name: String,
    pub kind: VoucherKind,
    pub value_type: VoucherValueType,
    pub value: Decimal,
    pub max_amount: Option<Decimal>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

fn voucher_view(voucher: VoucherModel) -> VoucherView {
    VoucherView {
        code: voucher.code,
        name: voucher.name,
        kind: voucher.kind,
        value_type: voucher.value_type,
        value: voucher.value,
        max_amount: voucher.max_amount,
        starts_at: voucher.starts_at,
        ends_at: voucher.ends_at,
    }
}

/// Projects the service-level cart detail into the wire shape.
pub fn cart_response(detail: CartDetail) -> CartResponse {
    let CartDetail {
        cart,
        items,
        address,
    } = detail;

    CartResponse {
        cart: CartView {
            id: cart.id,
            address: address.map(address_view),
            courier: cart.courier,
            courier_service: cart.courier_service,
            courier_eta: cart.courier_eta,
            courier_price: cart.courier_price,
            voucher_id: cart.voucher_id,
            voucher_discount: cart.voucher_discount,
            voucher_cashback: cart.voucher_cashback,
            service_fee: cart.service_fee,
            use_coin: cart.use_coin,
            coin_applied: cart.coin_applied,
            total: cart.total,
            total_payment: cart.total_payment,
        },
        items: items
            .into_iter()
            .map(|entry| CartItemView {
                id: entry.item.id,
                product: ProductView {
                    id: entry.product.id,
                    seller_id: entry.product.seller_id,
                    name: entry.product.name,
                    price: entry.product.price,
                    price_sale: entry.product.price_sale,
                    stock: entry.product.stock,
                },
                variations: entry.item.variations,
                quantity: entry.item.quantity,
                note: entry.item.note,
                subtotal: entry.subtotal,
            })
            .collect(),
    }
}
