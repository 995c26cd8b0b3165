use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::{
        cart, cart_item, order, order_item, Cart, CartItem, Order, PaymentMethod, StatusCode,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::CartService,
        coin_ledger,
        orders::{OrderDetail, OrderService},
        payment::{ChargeRequest, PaymentProvider},
    },
};

/// Attempts before invoice-number generation fails closed.
const INVOICE_ATTEMPTS: u32 = 5;

/// Converts the buyer's mutable cart into an immutable order, atomically.
///
/// Everything between the precondition checks and the commit happens in one
/// transaction: the order snapshot, its items, the initial status entry, the
/// coin debit, the payment handle, and the cart deletion. A failure at any
/// step leaves no trace of the attempt. A concurrent checkout of the same
/// cart finds the cart already deleted inside its own transaction and fails
/// with `EmptyCart`.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    cart_service: Arc<CartService>,
    order_service: Arc<OrderService>,
    payment_provider: Arc<dyn PaymentProvider>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        cart_service: Arc<CartService>,
        order_service: Arc<OrderService>,
        payment_provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            cart_service,
            order_service,
            payment_provider,
        }
    }

    #[instrument(skip(self))]
    pub async fn checkout(
        &self,
        buyer_id: Uuid,
        payment_method: PaymentMethod,
    ) -> Result<OrderDetail, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find()
            .filter(cart::Column::BuyerId.eq(buyer_id))
            .one(&txn)
            .await?
            .ok_or(ServiceError::EmptyCart)?;

        let items = CartService::items_with_products(&txn, cart.id).await?;
        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        // Snapshot fresh totals; the stored ones are recomputed on every
        // mutation but prices or balances may have moved since.
        let cart = self.cart_service.recompute(&txn, cart).await?;

        let courier = cart.courier.clone().ok_or(ServiceError::CourierNotSelected)?;
        let courier_service = cart
            .courier_service
            .clone()
            .ok_or(ServiceError::CourierNotSelected)?;
        let address_id = cart.address_id.ok_or_else(|| {
            ServiceError::ValidationError("delivery address has not been set".to_string())
        })?;

        let seller_id = items[0].1.seller_id;
        let order_id = Uuid::new_v4();
        let invoice_number = Self::allocate_invoice_number(&txn).await?;
        let coin_applied = cart.coin_applied;
        let total_payment = cart.total_payment;

        let order = order::ActiveModel {
            id: Set(order_id),
            invoice_number: Set(invoice_number.clone()),
            buyer_id: Set(buyer_id),
            seller_id: Set(seller_id),
            address_id: Set(address_id),
            courier: Set(courier),
            courier_service: Set(courier_service),
            courier_eta: Set(cart.courier_eta.clone()),
            courier_price: Set(cart.courier_price),
            voucher_id: Set(cart.voucher_id),
            voucher_discount: Set(cart.voucher_discount),
            voucher_cashback: Set(cart.voucher_cashback),
            service_fee: Set(cart.service_fee),
            coin_applied: Set(coin_applied),
            total: Set(cart.total),
            total_payment: Set(total_payment),
            payment_method: Set(payment_method),
            payment_reference: Set(None),
            payment_expires_at: Set(Some(
                Utc::now() + Duration::hours(self.config.payment_expiry_hours),
            )),
            is_paid: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        for (item, _) in &items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                variations: Set(item.variations.clone()),
                quantity: Set(item.quantity),
                note: Set(item.note.clone()),
            }
            .insert(&txn)
            .await?;
        }

        OrderService::append_status(
            &txn,
            order_id,
            StatusCode::PendingPayment,
            "Please complete your payment",
        )
        .await?;

        if coin_applied > Decimal::ZERO {
            coin_ledger::debit(
                &txn,
                buyer_id,
                coin_applied,
                format!("Payment for order {}", invoice_number),
            )
            .await?;
        }

        let charge = self
            .payment_provider
            .create_charge(ChargeRequest {
                order_id,
                gross_amount: total_payment,
                method: payment_method,
            })
            .await?;

        let mut order_update: order::ActiveModel = order.into();
        order_update.payment_reference = Set(Some(charge.reference));
        order_update.update(&txn).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        Cart::delete_by_id(cart.id).exec(&txn).await?;

        txn.commit().await?;

        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;
        if coin_applied > Decimal::ZERO {
            self.event_sender
                .send_or_log(Event::CoinDebited {
                    buyer_id,
                    amount: coin_applied,
                })
                .await;
        }

        info!(%buyer_id, %order_id, %invoice_number, "checkout committed");
        self.order_service.detail(buyer_id, order_id).await
    }

    /// Allocates a unique invoice number: one random token checked against
    /// the unique index, regenerated at most [`INVOICE_ATTEMPTS`] times
    /// before failing closed.
    async fn allocate_invoice_number(
        conn: &impl ConnectionTrait,
    ) -> Result<String, ServiceError> {
        for _ in 0..INVOICE_ATTEMPTS {
            let candidate = generate_invoice_number();
            let taken = Order::find()
                .filter(order::Column::InvoiceNumber.eq(&candidate))
                .one(conn)
                .await?
                .is_some();
            if !taken {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "could not allocate a unique invoice number".to_string(),
        ))
    }
}

fn generate_invoice_number() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("INV/{}/{}", Utc::now().format("%Y%m%d"), token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_number_shape() {
        let invoice = generate_invoice_number();
        let parts: Vec<&str> = invoice.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!parts[2].chars().any(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn invoice_numbers_vary() {
        let a = generate_invoice_number();
        let b = generate_invoice_number();
        assert_ne!(a, b);
    }
}
