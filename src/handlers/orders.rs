use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedBuyer,
    entities::{AddressModel, OrderStatusModel, PaymentMethod, SellerModel, StatusCode},
    errors::ServiceError,
    handlers::common::success_response,
    services::orders::{OrderDetail, OrderListFilter},
    AppState,
};

/// Creates the router for buyer-facing order endpoints.
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/mark-done", post(mark_order_done))
}

/// List the buyer's orders, optionally filtered by latest status or search.
async fn list_orders(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Query(filter): Query<OrderListFilter>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let (orders, total) = state.services.orders.list(buyer.id, filter).await?;

    let orders: Vec<OrderDetailView> = orders.into_iter().map(order_detail_view).collect();
    Ok(success_response(OrderListView { orders, total }))
}

/// Full nested detail for one of the buyer's orders.
async fn get_order(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let detail = state.services.orders.detail(buyer.id, id).await?;
    Ok(success_response(order_detail_view(detail)))
}

/// Buyer confirms receipt; appends `done` and credits any cashback.
async fn mark_order_done(
    buyer: AuthenticatedBuyer,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let detail = state.services.orders.mark_done(buyer.id, id).await?;
    Ok(success_response(order_detail_view(detail)))
}

// Response views. Wire shapes are explicit projections, decoupled from the
// storage models.

#[derive(Debug, Serialize)]
pub struct OrderListView {
    pub orders: Vec<OrderDetailView>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct OrderDetailView {
    pub id: Uuid,
    pub invoice_number: String,
    pub seller: SellerView,
    pub address: Option<AddressView>,
    pub courier: String,
    pub courier_service: String,
    pub courier_eta: Option<String>,
    pub courier_price: Decimal,
    pub voucher_discount: Decimal,
    pub voucher_cashback: Decimal,
    pub service_fee: Decimal,
    pub coin_applied: Decimal,
    pub total: Decimal,
    pub total_payment: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub payment_expires_at: Option<DateTime<Utc>>,
    pub is_paid: bool,
    pub last_status: Option<StatusView>,
    pub items: Vec<OrderItemView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SellerView {
    pub id: Uuid,
    pub store_name: String,
}

#[derive(Debug, Serialize)]
pub struct AddressView {
    pub id: Uuid,
    pub label: String,
    pub recipient: String,
    pub phone: String,
    pub detail: String,
    pub area_code: String,
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub status: StatusCode,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub variations: Option<serde_json::Value>,
    pub quantity: i32,
    pub note: Option<String>,
}

pub fn seller_view(seller: SellerModel) -> SellerView {
    SellerView {
        id: seller.id,
        store_name: seller.store_name,
    }
}

pub fn address_view(address: AddressModel) -> AddressView {
    AddressView {
        id: address.id,
        label: address.label,
        recipient: address.recipient,
        phone: address.phone,
        detail: address.detail,
        area_code: address.area_code,
    }
}

pub fn status_view(status: OrderStatusModel) -> StatusView {
    StatusView {
        status: status.status,
        description: status.description,
        created_at: status.created_at,
    }
}

pub fn order_detail_view(detail: OrderDetail) -> OrderDetailView {
    let OrderDetail {
        order,
        items,
        seller,
        address,
        last_status,
    } = detail;

    OrderDetailView {
        id: order.id,
        invoice_number: order.invoice_number,
        seller: seller_view(seller),
        address: address.map(address_view),
        courier: order.courier,
        courier_service: order.courier_service,
        courier_eta: order.courier_eta,
        courier_price: order.courier_price,
        voucher_discount: order.voucher_discount,
        voucher_cashback: order.voucher_cashback,
        service_fee: order.service_fee,
        coin_applied: order.coin_applied,
        total: order.total,
        total_payment: order.total_payment,
        payment_method: order.payment_method,
        payment_reference: order.payment_reference,
        payment_expires_at: order.payment_expires_at,
        is_paid: order.is_paid,
        last_status: last_status.map(status_view),
        items: items
            .into_iter()
            .map(|(item, product)| OrderItemView {
                id: item.id,
                product_id: product.id,
                product_name: product.name,
                variations: item.variations,
                quantity: item.quantity,
                note: item.note,
            })
            .collect(),
        created_at: order.created_at,
    }
}
