pub mod cart;
pub mod common;
pub mod orders;
pub mod payment_webhooks;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    notifications::{LogNotifier, NotificationSender},
    payment::{MidtransGateway, PaymentProvider},
    CartService, CheckoutService, OrderService, ShippingGateway, VoucherService,
};
use std::sync::Arc;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub vouchers: Arc<VoucherService>,
    pub shipping: Arc<ShippingGateway>,
}

impl AppServices {
    /// Build the default service container with the real gateway clients.
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, config: Arc<AppConfig>) -> Self {
        let payment_provider: Arc<dyn PaymentProvider> =
            Arc::new(MidtransGateway::from_config(&config));
        let notifier: Arc<dyn NotificationSender> = Arc::new(LogNotifier);
        Self::with_collaborators(db, event_sender, config, payment_provider, notifier)
    }

    /// Build the service container with injected external collaborators.
    /// Tests swap in stub payment providers and notifiers here.
    pub fn with_collaborators(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        payment_provider: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        let cart = Arc::new(CartService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            notifier,
        ));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            event_sender,
            config.clone(),
            cart.clone(),
            orders.clone(),
            payment_provider,
        ));
        let vouchers = Arc::new(VoucherService::new(db));
        let shipping = Arc::new(ShippingGateway::from_config(&config));

        Self {
            cart,
            checkout,
            orders,
            vouchers,
            shipping,
        }
    }
}
