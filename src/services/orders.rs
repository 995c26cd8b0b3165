use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        order, order_item, order_status, product, seller, Address, AddressModel, Order, OrderItem,
        OrderItemModel, OrderModel, OrderStatus, OrderStatusModel, Product, ProductModel, Seller,
        SellerModel, StatusCode,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{coin_ledger, notifications::NotificationSender},
};

/// Order read side and payment-driven state transitions. Orders themselves
/// are immutable snapshots; the only mutations are the append-only status
/// log, the `is_paid` flag, and the stock decrement applied once on payment.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    notifier: Arc<dyn NotificationSender>,
}

/// Order with every relation a client needs to render it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: OrderModel,
    pub items: Vec<(OrderItemModel, ProductModel)>,
    pub seller: SellerModel,
    pub address: Option<AddressModel>,
    pub last_status: Option<OrderStatusModel>,
}

/// Listing filter: optional latest-status filter and free-text search over
/// invoice number, store name, and product name.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListFilter {
    pub last_status: Option<StatusCode>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Payment notification after signature verification.
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    pub order_id: Uuid,
    pub transaction_status: String,
}

/// What a webhook delivery did. Redeliveries and unknown statuses resolve
/// without touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    AlreadyProcessed,
    Ignored,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifier,
        }
    }

    /// Lists the buyer's orders, newest first.
    #[instrument(skip(self, filter))]
    pub async fn list(
        &self,
        buyer_id: Uuid,
        filter: OrderListFilter,
    ) -> Result<(Vec<OrderDetail>, u64), ServiceError> {
        let mut query = Order::find()
            .filter(order::Column::BuyerId.eq(buyer_id))
            .order_by_desc(order::Column::CreatedAt);

        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            // Resolve store-name and product-name matches to id lists first,
            // then OR them with the invoice match (the source does the same
            // with plucked id sets).
            let seller_ids: Vec<Uuid> = Seller::find()
                .filter(seller::Column::StoreName.contains(search))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect();

            let product_ids: Vec<Uuid> = Product::find()
                .filter(product::Column::Name.contains(search))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| p.id)
                .collect();

            let order_ids_by_product: Vec<Uuid> = if product_ids.is_empty() {
                Vec::new()
            } else {
                OrderItem::find()
                    .filter(order_item::Column::ProductId.is_in(product_ids))
                    .all(&*self.db)
                    .await?
                    .into_iter()
                    .map(|i| i.order_id)
                    .collect()
            };

            let mut condition = Condition::any()
                .add(order::Column::InvoiceNumber.contains(search));
            if !seller_ids.is_empty() {
                condition = condition.add(order::Column::SellerId.is_in(seller_ids));
            }
            if !order_ids_by_product.is_empty() {
                condition = condition.add(order::Column::Id.is_in(order_ids_by_product));
            }
            query = query.filter(condition);
        }

        let orders = query.all(&*self.db).await?;

        // The latest-status filter needs each order's newest log entry, so
        // it is applied after projection.
        let mut details = Vec::with_capacity(orders.len());
        for order in orders {
            let detail = self.project(&*self.db, order).await?;
            let matches = match filter.last_status {
                Some(wanted) => detail
                    .last_status
                    .as_ref()
                    .map(|s| s.status == wanted)
                    .unwrap_or(false),
                None => true,
            };
            if matches {
                details.push(detail);
            }
        }

        let total = details.len() as u64;
        let per_page = filter.per_page.unwrap_or(10).max(1);
        let page = filter.page.unwrap_or(1).max(1);
        let start = ((page - 1) * per_page) as usize;
        let paged = details
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();

        Ok((paged, total))
    }

    /// Loads one of the buyer's orders with full nested detail.
    #[instrument(skip(self))]
    pub async fn detail(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::BuyerId.eq(buyer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        self.project(&*self.db, order).await
    }

    /// Projection used by list/detail/checkout responses.
    pub async fn project(
        &self,
        conn: &impl ConnectionTrait,
        order: OrderModel,
    ) -> Result<OrderDetail, ServiceError> {
        let items = Self::items_with_products(conn, order.id).await?;

        let seller = Seller::find_by_id(order.seller_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Seller {} not found", order.seller_id))
            })?;

        let address = Address::find_by_id(order.address_id).one(conn).await?;
        let last_status = Self::latest_status(conn, order.id).await?;

        Ok(OrderDetail {
            order,
            items,
            seller,
            address,
            last_status,
        })
    }

    pub async fn items_with_products(
        conn: &impl ConnectionTrait,
        order_id: Uuid,
    ) -> Result<Vec<(OrderItemModel, ProductModel)>, ServiceError> {
        let rows = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .find_also_related(Product)
            .all(conn)
            .await?;

        rows.into_iter()
            .map(|(item, product)| {
                let product = product.ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;
                Ok((item, product))
            })
            .collect()
    }

    /// The order's current status: latest log entry by insertion order.
    pub async fn latest_status(
        conn: &impl ConnectionTrait,
        order_id: Uuid,
    ) -> Result<Option<OrderStatusModel>, ServiceError> {
        Ok(OrderStatus::find()
            .filter(order_status::Column::OrderId.eq(order_id))
            .order_by_desc(order_status::Column::Id)
            .one(conn)
            .await?)
    }

    /// Appends a status log entry. Entries are never updated or deleted.
    pub async fn append_status(
        conn: &impl ConnectionTrait,
        order_id: Uuid,
        status: StatusCode,
        description: impl Into<String>,
    ) -> Result<OrderStatusModel, ServiceError> {
        let entry = order_status::ActiveModel {
            id: NotSet,
            order_id: Set(order_id),
            status: Set(status),
            description: Set(description.into()),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        Ok(entry)
    }

    /// Applies an asynchronous payment notification.
    ///
    /// `capture`/`settlement` mark the order paid and decrement stock;
    /// because deliveries can repeat, the transition is a no-op when the
    /// order is already paid, so stock is decremented exactly once.
    /// `cancel`/`deny` append a failed status. Unknown statuses are logged
    /// and ignored for forward compatibility with the gateway vocabulary.
    #[instrument(skip(self))]
    pub async fn apply_payment_notification(
        &self,
        notification: PaymentNotification,
    ) -> Result<WebhookOutcome, ServiceError> {
        match notification.transaction_status.as_str() {
            "capture" | "settlement" => self.apply_paid(notification.order_id).await,
            "cancel" | "deny" => self.apply_failed(notification.order_id).await,
            other => {
                info!(order_id = %notification.order_id, status = other, "ignoring unknown payment status");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn apply_paid(&self, order_id: Uuid) -> Result<WebhookOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.is_paid {
            info!(%order_id, "payment notification redelivered; already paid");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        Self::append_status(
            &txn,
            order_id,
            StatusCode::Paid,
            "Payment received, awaiting shipment",
        )
        .await?;

        let items = Self::items_with_products(&txn, order_id).await?;
        for (item, product) in &items {
            let new_stock = product.stock - item.quantity;
            let mut active: product::ActiveModel = product.clone().into();
            active.stock = Set(new_stock);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        let mut active: order::ActiveModel = order.clone().into();
        active.is_paid = Set(true);
        active.payment_expires_at = Set(None);
        let order = active.update(&txn).await?;

        txn.commit().await?;

        // Fire-and-forget: a notification failure never rolls back payment.
        match Seller::find_by_id(order.seller_id).one(&*self.db).await {
            Ok(Some(seller)) => {
                if let Err(e) = self.notifier.notify_seller_new_order(&seller, &order).await {
                    warn!(%order_id, "seller notification failed: {}", e);
                }
            }
            Ok(None) => warn!(%order_id, "seller missing for paid order"),
            Err(e) => warn!(%order_id, "seller lookup failed: {}", e),
        }

        self.event_sender.send_or_log(Event::OrderPaid(order_id)).await;
        info!(%order_id, "order marked paid");
        Ok(WebhookOutcome::Applied)
    }

    async fn apply_failed(&self, order_id: Uuid) -> Result<WebhookOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.is_paid {
            info!(%order_id, "ignoring failure notification for a paid order");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        if let Some(latest) = Self::latest_status(&txn, order_id).await? {
            if latest.status.is_terminal() {
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
        }

        Self::append_status(&txn, order_id, StatusCode::Failed, "Payment failed").await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderPaymentFailed(order_id))
            .await;
        Ok(WebhookOutcome::Applied)
    }

    /// Buyer confirms receipt. Appends `done` and credits the order's
    /// cashback to the buyer's coin balance; the status gate makes the
    /// credit happen exactly once.
    #[instrument(skip(self))]
    pub async fn mark_done(
        &self,
        buyer_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .filter(order::Column::BuyerId.eq(buyer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let latest = Self::latest_status(&txn, order_id).await?;
        match latest.as_ref().map(|s| s.status) {
            Some(StatusCode::Shipped) => {}
            Some(StatusCode::Done) => {
                return Err(ServiceError::ValidationError(
                    "order is already completed".to_string(),
                ));
            }
            _ => {
                return Err(ServiceError::ValidationError(
                    "order has not been shipped yet".to_string(),
                ));
            }
        }

        Self::append_status(&txn, order_id, StatusCode::Done, "Order completed by buyer").await?;

        if order.voucher_cashback > Decimal::ZERO {
            coin_ledger::credit(
                &txn,
                buyer_id,
                order.voucher_cashback,
                format!("Cashback for order {}", order.invoice_number),
            )
            .await?;
        }

        txn.commit().await?;

        if order.voucher_cashback > Decimal::ZERO {
            self.event_sender
                .send_or_log(Event::CoinCredited {
                    buyer_id,
                    amount: order.voucher_cashback,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::OrderCompleted(order_id))
            .await;

        self.detail(buyer_id, order_id).await
    }
}
