mod common;

use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use lokapasar_api::{
    entities::{VoucherKind, VoucherValueType},
    errors::ServiceError,
    services::cart::{AddItemInput, UpdateItemInput},
    services::shipping::ServiceOption,
};

fn add_input(product_id: Uuid, qty: i32) -> AddItemInput {
    AddItemInput {
        product_id,
        quantity: qty,
        note: None,
        variations: None,
    }
}

fn reg_shipping(price: Decimal) -> ServiceOption {
    ServiceOption {
        service: "REG".to_string(),
        description: "Layanan Reguler".to_string(),
        eta: "2-3 day".to_string(),
        price,
    }
}

#[tokio::test]
async fn cart_is_created_lazily_with_default_address() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let address_id = app.seed_address(buyer, "114", true).await;

    let first = app.services.cart.get_or_create(buyer).await.unwrap();
    assert_eq!(first.buyer_id, buyer);
    assert_eq!(first.address_id, Some(address_id));
    // The flat service fee is the only charge on an empty cart.
    assert_eq!(first.total, dec!(2000));
    assert_eq!(first.coin_applied, Decimal::ZERO);

    let second = app.services.cart.get_or_create(buyer).await.unwrap();
    assert_eq!(second.id, first.id);
}

#[tokio::test]
async fn add_item_recomputes_and_persists_totals() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    app.seed_address(buyer, "114", true).await;
    let seller = app.seed_seller("Toko Maju").await;
    let product = app
        .seed_product(seller, "Kemeja Batik", dec!(50000), None, 10)
        .await;

    let detail = app
        .services
        .cart
        .add_item(buyer, add_input(product, 2))
        .await
        .unwrap();

    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].subtotal, dec!(100000));
    // subtotal + service fee (2_000), no shipping or voucher yet
    assert_eq!(detail.cart.service_fee, dec!(2000));
    assert_eq!(detail.cart.total, dec!(102000));
    assert_eq!(detail.cart.total_payment, dec!(102000));
}

#[tokio::test]
async fn sale_price_overrides_base_price() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = app.seed_seller("Toko Diskon").await;
    let product = app
        .seed_product(seller, "Sepatu", dec!(80000), Some(dec!(60000)), 5)
        .await;

    let detail = app
        .services
        .cart
        .add_item(buyer, add_input(product, 1))
        .await
        .unwrap();

    assert_eq!(detail.items[0].subtotal, dec!(60000));
}

#[tokio::test]
async fn second_seller_is_rejected_and_cart_unchanged() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller_a = app.seed_seller("Toko A").await;
    let seller_b = app.seed_seller("Toko B").await;
    let product_a = app.seed_product(seller_a, "Buku", dec!(25000), None, 10).await;
    let product_b = app.seed_product(seller_b, "Pensil", dec!(5000), None, 10).await;

    app.services
        .cart
        .add_item(buyer, add_input(product_a, 1))
        .await
        .unwrap();

    let err = app
        .services
        .cart
        .add_item(buyer, add_input(product_b, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SellerMismatch));

    let detail = app.services.cart.detail(buyer).await.unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].product.id, product_a);
    assert_eq!(detail.cart.total, dec!(27000));
}

#[tokio::test]
async fn stock_is_checked_on_add_and_update() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = app.seed_seller("Toko Stok").await;
    let product = app.seed_product(seller, "Gelas", dec!(10000), None, 3).await;

    let err = app
        .services
        .cart
        .add_item(buyer, add_input(product, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    let detail = app
        .services
        .cart
        .add_item(buyer, add_input(product, 2))
        .await
        .unwrap();
    let item_id = detail.items[0].item.id;

    let err = app
        .services
        .cart
        .update_item(
            buyer,
            item_id,
            UpdateItemInput {
                quantity: 5,
                note: None,
                variations: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    let detail = app
        .services
        .cart
        .update_item(
            buyer,
            item_id,
            UpdateItemInput {
                quantity: 3,
                note: Some("bungkus terpisah".to_string()),
                variations: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(detail.items[0].item.quantity, 3);
    assert_eq!(detail.cart.total, dec!(32000));
}

#[tokio::test]
async fn remove_item_recomputes_totals() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = app.seed_seller("Toko Hapus").await;
    let product = app.seed_product(seller, "Topi", dec!(15000), None, 10).await;

    let detail = app
        .services
        .cart
        .add_item(buyer, add_input(product, 1))
        .await
        .unwrap();
    let item_id = detail.items[0].item.id;

    let detail = app.services.cart.remove_item(buyer, item_id).await.unwrap();
    assert!(detail.items.is_empty());
    // Only the flat service fee remains.
    assert_eq!(detail.cart.total, dec!(2000));
}

#[tokio::test]
async fn discount_voucher_scenario_matches_worked_example() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    app.seed_address(buyer, "114", true).await;
    let seller = app.seed_seller("Toko Resmi").await;
    let product = app
        .seed_product(seller, "Tas Kulit", dec!(50000), None, 10)
        .await;
    app.seed_voucher(
        "DISCOUNT10",
        None,
        VoucherKind::Discount,
        VoucherValueType::Percentage,
        dec!(10),
        Some(dec!(10000)),
    )
    .await;

    app.services
        .cart
        .add_item(buyer, add_input(product, 2))
        .await
        .unwrap();
    app.services
        .cart
        .set_shipping(buyer, "jne", &reg_shipping(dec!(15000)))
        .await
        .unwrap();

    let detail = app
        .services
        .cart
        .apply_voucher(buyer, "DISCOUNT10")
        .await
        .unwrap();

    // subtotal 100_000, shipping 15_000, fee 2_000, discount min(10_000, 10_000)
    assert_eq!(detail.cart.voucher_discount, dec!(10000));
    assert_eq!(detail.cart.total, dec!(107000));

    // Coin: cap (10% of subtotal) binds before the 200_000 balance.
    app.seed_coins(buyer, dec!(200000)).await;
    let detail = app.services.cart.toggle_coin(buyer, true).await.unwrap();
    assert_eq!(detail.cart.coin_applied, dec!(10000));
    assert_eq!(detail.cart.total_payment, dec!(97000));

    // Toggling off re-derives the applied amount.
    let detail = app.services.cart.toggle_coin(buyer, false).await.unwrap();
    assert_eq!(detail.cart.coin_applied, Decimal::ZERO);
    assert_eq!(detail.cart.total_payment, dec!(107000));
}

#[tokio::test]
async fn balance_caps_coin_when_below_subtotal_share() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = app.seed_seller("Toko Koin").await;
    let product = app
        .seed_product(seller, "Jam Tangan", dec!(100000), None, 5)
        .await;

    app.services
        .cart
        .add_item(buyer, add_input(product, 1))
        .await
        .unwrap();
    app.seed_coins(buyer, dec!(2500)).await;

    let detail = app.services.cart.toggle_coin(buyer, true).await.unwrap();
    assert_eq!(detail.cart.coin_applied, dec!(2500));
}

#[tokio::test]
async fn expired_voucher_is_rejected_and_not_attached() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    app.seed_expired_voucher("LATE").await;

    let err = app
        .services
        .cart
        .apply_voucher(buyer, "LATE")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::VoucherIneligible(_)));

    let detail = app.services.cart.detail(buyer).await.unwrap();
    assert_eq!(detail.cart.voucher_id, None);
}

#[tokio::test]
async fn seller_scoped_voucher_rejects_other_sellers_cart() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller_a = app.seed_seller("Toko A").await;
    let seller_b = app.seed_seller("Toko B").await;
    let product_b = app.seed_product(seller_b, "Kopi", dec!(40000), None, 10).await;
    app.seed_voucher(
        "TOKOA",
        Some(seller_a),
        VoucherKind::Discount,
        VoucherValueType::Fixed,
        dec!(5000),
        None,
    )
    .await;

    app.services
        .cart
        .add_item(buyer, add_input(product_b, 1))
        .await
        .unwrap();

    let err = app
        .services
        .cart
        .apply_voucher(buyer, "TOKOA")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::VoucherIneligible(_)));

    let detail = app.services.cart.detail(buyer).await.unwrap();
    assert_eq!(detail.cart.voucher_id, None);
    assert_eq!(detail.cart.voucher_discount, Decimal::ZERO);
}

#[tokio::test]
async fn cashback_voucher_accrues_without_reducing_total() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = app.seed_seller("Toko Cashback").await;
    let product = app
        .seed_product(seller, "Keyboard", dec!(60000), None, 10)
        .await;
    app.seed_voucher(
        "CASHBACK5",
        None,
        VoucherKind::Cashback,
        VoucherValueType::Percentage,
        dec!(5),
        Some(dec!(10000)),
    )
    .await;

    app.services
        .cart
        .add_item(buyer, add_input(product, 1))
        .await
        .unwrap();
    let detail = app
        .services
        .cart
        .apply_voucher(buyer, "CASHBACK5")
        .await
        .unwrap();

    assert_eq!(detail.cart.voucher_cashback, dec!(3000));
    assert_eq!(detail.cart.voucher_discount, Decimal::ZERO);
    assert_eq!(detail.cart.total, dec!(62000));

    let detail = app.services.cart.remove_voucher(buyer).await.unwrap();
    assert_eq!(detail.cart.voucher_cashback, Decimal::ZERO);
    assert_eq!(detail.cart.voucher_id, None);
}

#[tokio::test]
async fn shipping_context_enforces_preconditions() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();

    // Empty cart
    let err = app
        .services
        .cart
        .shipping_context(buyer)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::EmptyCart));

    // Cart with an item but no delivery address
    let seller = app.seed_seller("Toko Kirim").await;
    let product = app.seed_product(seller, "Payung", dec!(20000), None, 10).await;
    app.services
        .cart
        .add_item(buyer, add_input(product, 3))
        .await
        .unwrap();

    let err = app
        .services
        .cart
        .shipping_context(buyer)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    // With a delivery address the context resolves route and weight.
    let address_id = app.seed_address(buyer, "114", false).await;
    app.services.cart.set_address(buyer, address_id).await.unwrap();

    let ctx = app.services.cart.shipping_context(buyer).await.unwrap();
    assert_eq!(ctx.origin, "501");
    assert_eq!(ctx.destination, "114");
    assert_eq!(ctx.weight_grams, 1500); // 3 x 500g
}

#[tokio::test]
async fn foreign_address_cannot_be_selected() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let other_user = Uuid::new_v4();
    let foreign_address = app.seed_address(other_user, "999", true).await;

    let err = app
        .services
        .cart
        .set_address(buyer, foreign_address)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
