#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use sea_orm_migration::MigratorTrait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use lokapasar_api::{
    config::AppConfig,
    db::DbPool,
    entities::{address, coin_transaction, product, seller, voucher},
    entities::{VoucherKind, VoucherValueType},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::notifications::{LogNotifier, NotificationSender},
    services::payment::{ChargeRequest, ChargeResponse, PaymentProvider},
};

/// Payment gateway stub: records charges, optionally fails every call.
#[derive(Debug, Default)]
pub struct StubPaymentProvider {
    pub fail: bool,
    pub charges: Mutex<Vec<ChargeRequest>>,
}

impl StubPaymentProvider {
    pub fn failing() -> Self {
        Self {
            fail: true,
            charges: Mutex::new(Vec::new()),
        }
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentProvider for StubPaymentProvider {
    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeResponse, ServiceError> {
        if self.fail {
            return Err(ServiceError::PaymentGatewayError(
                "stub gateway rejected the charge".to_string(),
            ));
        }
        let reference = format!("stub-{}", request.order_id);
        self.charges.lock().unwrap().push(request);
        Ok(ChargeResponse { reference })
    }
}

/// Helper harness over an in-memory SQLite database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
    pub payment: Arc<StubPaymentProvider>,
    pub event_sender: EventSender,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_payment_provider(Arc::new(StubPaymentProvider::default())).await
    }

    /// Construct with a custom payment stub (e.g. one that always fails).
    pub async fn with_payment_provider(payment: Arc<StubPaymentProvider>) -> Self {
        Self::build(payment, None).await
    }

    /// Construct with webhook signature enforcement enabled.
    pub async fn with_webhook_server_key(server_key: &str) -> Self {
        Self::build(
            Arc::new(StubPaymentProvider::default()),
            Some(server_key.to_string()),
        )
        .await
    }

    async fn build(payment: Arc<StubPaymentProvider>, server_key: Option<String>) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // The worked pricing scenarios use a 2_000 IDR service fee.
        cfg.service_fee = 2000.0;
        cfg.payment_server_key = server_key;

        // A single pooled connection keeps every query on the same
        // in-memory database.
        let mut opt = ConnectOptions::new(cfg.database_url.clone());
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt)
            .await
            .expect("failed to create test database");
        lokapasar_api::migrator::Migrator::up(&db, None)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(db);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let config = Arc::new(cfg);
        let notifier: Arc<dyn NotificationSender> = Arc::new(LogNotifier);
        let services = AppServices::with_collaborators(
            db.clone(),
            Arc::new(event_sender.clone()),
            config.clone(),
            payment.clone(),
            notifier,
        );

        Self {
            db,
            config,
            services,
            payment,
            event_sender,
            _event_task: event_task,
        }
    }

    /// The full API router, for request-level tests.
    pub fn router(&self) -> axum::Router {
        let state = Arc::new(lokapasar_api::AppState {
            db: self.db.clone(),
            config: (*self.config).clone(),
            event_sender: self.event_sender.clone(),
            services: self.services.clone(),
        });
        axum::Router::new()
            .nest("/api/v1", lokapasar_api::api_v1_routes())
            .with_state(state)
    }

    /// A valid bearer token for the given buyer.
    pub fn token_for(&self, buyer_id: Uuid) -> String {
        lokapasar_api::auth::issue_token(buyer_id, &self.config.jwt_secret, Duration::hours(1))
            .expect("failed to issue test token")
    }

    /// Seeds a seller with a default pickup address.
    pub async fn seed_seller(&self, store_name: &str) -> Uuid {
        let seller_id = Uuid::new_v4();
        seller::ActiveModel {
            id: Set(seller_id),
            store_name: Set(store_name.to_string()),
            email: Set(format!("{}@example.test", seller_id.simple())),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed seller");

        self.seed_address(seller_id, "501", true).await;
        seller_id
    }

    pub async fn seed_address(&self, user_id: Uuid, area_code: &str, is_default: bool) -> Uuid {
        let address_id = Uuid::new_v4();
        address::ActiveModel {
            id: Set(address_id),
            user_id: Set(user_id),
            label: Set("Home".to_string()),
            recipient: Set("Recipient".to_string()),
            phone: Set("+62811111111".to_string()),
            detail: Set("Jl. Example No. 1".to_string()),
            area_code: Set(area_code.to_string()),
            is_default: Set(is_default),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed address");
        address_id
    }

    pub async fn seed_product(
        &self,
        seller_id: Uuid,
        name: &str,
        price: Decimal,
        price_sale: Option<Decimal>,
        stock: i32,
    ) -> Uuid {
        let product_id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(product_id),
            seller_id: Set(seller_id),
            name: Set(name.to_string()),
            price: Set(price),
            price_sale: Set(price_sale),
            stock: Set(stock),
            weight_grams: Set(500),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed product");
        product_id
    }

    pub async fn seed_voucher(
        &self,
        code: &str,
        seller_id: Option<Uuid>,
        kind: VoucherKind,
        value_type: VoucherValueType,
        value: Decimal,
        max_amount: Option<Decimal>,
    ) -> Uuid {
        let voucher_id = Uuid::new_v4();
        voucher::ActiveModel {
            id: Set(voucher_id),
            code: Set(code.to_string()),
            name: Set(code.to_string()),
            seller_id: Set(seller_id),
            kind: Set(kind),
            value_type: Set(value_type),
            value: Set(value),
            max_amount: Set(max_amount),
            starts_at: Set(Utc::now() - Duration::days(1)),
            ends_at: Set(Utc::now() + Duration::days(7)),
            is_public: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed voucher");
        voucher_id
    }

    /// Seeds an expired voucher.
    pub async fn seed_expired_voucher(&self, code: &str) -> Uuid {
        let voucher_id = Uuid::new_v4();
        voucher::ActiveModel {
            id: Set(voucher_id),
            code: Set(code.to_string()),
            name: Set(code.to_string()),
            seller_id: Set(None),
            kind: Set(VoucherKind::Discount),
            value_type: Set(VoucherValueType::Fixed),
            value: Set(Decimal::from(5000)),
            max_amount: Set(None),
            starts_at: Set(Utc::now() - Duration::days(14)),
            ends_at: Set(Utc::now() - Duration::days(7)),
            is_public: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed voucher");
        voucher_id
    }

    /// Gives the buyer a starting coin balance.
    pub async fn seed_coins(&self, buyer_id: Uuid, amount: Decimal) {
        coin_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            buyer_id: Set(buyer_id),
            amount: Set(amount),
            description: Set("Seed balance".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed coins");
    }
}
