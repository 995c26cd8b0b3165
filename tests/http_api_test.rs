mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use tower::ServiceExt;
use uuid::Uuid;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn decimal_at(value: &Value, pointer: &str) -> Decimal {
    serde_json::from_value(value.pointer(pointer).cloned().unwrap()).unwrap()
}

#[tokio::test]
async fn cart_requires_authentication() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/v1/cart")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn add_to_cart_over_http_returns_recomputed_envelope() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = app.seed_seller("Toko HTTP").await;
    let product = app
        .seed_product(seller, "Headset", dec!(10000), None, 10)
        .await;
    let token = app.token_for(buyer);

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/cart")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "product_id": product, "qty": 1 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    // 10_000 item + 2_000 service fee
    assert_eq!(decimal_at(&body, "/data/cart/total"), dec!(12000));
}

#[tokio::test]
async fn invalid_quantity_maps_to_validation_error() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let token = app.token_for(buyer);

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/cart")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "product_id": Uuid::new_v4(), "qty": 0 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "validation_error");
}

fn midtrans_signature(order_id: &str, status_code: &str, gross_amount: &str, key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[tokio::test]
async fn webhook_rejects_bad_signature_when_key_configured() {
    let app = TestApp::with_webhook_server_key("server-key").await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "order_id": Uuid::new_v4(),
                        "transaction_status": "settlement",
                        "status_code": "200",
                        "gross_amount": "117000.00",
                        "signature_key": "not-a-real-signature"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_with_unknown_status_still_answers_success() {
    let app = TestApp::with_webhook_server_key("server-key").await;
    let buyer = Uuid::new_v4();
    app.seed_address(buyer, "114", true).await;
    let seller = app.seed_seller("Toko Status").await;
    let product = app
        .seed_product(seller, "Lampu", dec!(30000), None, 10)
        .await;

    app.services
        .cart
        .add_item(
            buyer,
            lokapasar_api::services::cart::AddItemInput {
                product_id: product,
                quantity: 1,
                note: None,
                variations: None,
            },
        )
        .await
        .unwrap();
    app.services
        .cart
        .set_shipping(
            buyer,
            "jne",
            &lokapasar_api::services::shipping::ServiceOption {
                service: "REG".to_string(),
                description: "Layanan Reguler".to_string(),
                eta: "2-3 day".to_string(),
                price: dec!(10000),
            },
        )
        .await
        .unwrap();
    let order = app
        .services
        .checkout
        .checkout(buyer, lokapasar_api::entities::PaymentMethod::Qris)
        .await
        .unwrap()
        .order;

    let order_id = order.id.to_string();
    let signature = midtrans_signature(&order_id, "201", "42000.00", "server-key");

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "order_id": order_id,
                        "transaction_status": "pending",
                        "status_code": "201",
                        "gross_amount": "42000.00",
                        "signature_key": signature
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    // The gateway must never see an error for a status we do not handle.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["result"], "ignored");
}

#[tokio::test]
async fn signed_settlement_marks_order_paid() {
    let app = TestApp::with_webhook_server_key("server-key").await;
    let buyer = Uuid::new_v4();
    app.seed_address(buyer, "114", true).await;
    let seller = app.seed_seller("Toko Lunas").await;
    let product = app
        .seed_product(seller, "Speaker", dec!(80000), None, 4)
        .await;

    app.services
        .cart
        .add_item(
            buyer,
            lokapasar_api::services::cart::AddItemInput {
                product_id: product,
                quantity: 1,
                note: None,
                variations: None,
            },
        )
        .await
        .unwrap();
    app.services
        .cart
        .set_shipping(
            buyer,
            "tiki",
            &lokapasar_api::services::shipping::ServiceOption {
                service: "ECO".to_string(),
                description: "Ekonomi".to_string(),
                eta: "4 day".to_string(),
                price: dec!(9000),
            },
        )
        .await
        .unwrap();
    let order = app
        .services
        .checkout
        .checkout(buyer, lokapasar_api::entities::PaymentMethod::BcaVa)
        .await
        .unwrap()
        .order;

    let order_id = order.id.to_string();
    let signature = midtrans_signature(&order_id, "200", "91000.00", "server-key");

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "order_id": order_id,
                        "transaction_status": "settlement",
                        "status_code": "200",
                        "gross_amount": "91000.00",
                        "signature_key": signature
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["result"], "applied");

    let detail = app.services.orders.detail(buyer, order.id).await.unwrap();
    assert!(detail.order.is_paid);
}
