use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the cart and order pipeline. Consumed by the in-process
/// event loop; every emission is best-effort and must never block or fail a
/// request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemUpdated { cart_id: Uuid, item_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },
    VoucherApplied { cart_id: Uuid, voucher_id: Uuid },
    VoucherRemoved(Uuid),
    ShippingSelected { cart_id: Uuid, courier: String },

    // Checkout and order events
    OrderCreated(Uuid),
    OrderPaid(Uuid),
    OrderPaymentFailed(Uuid),
    OrderCompleted(Uuid),

    // Coin ledger events
    CoinDebited { buyer_id: Uuid, amount: Decimal },
    CoinCredited { buyer_id: Uuid, amount: Decimal },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing the failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing when the channel is closed.
    /// Request paths use this so event delivery never aborts a mutation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Processes incoming events until the channel closes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "order created");
            }
            Event::OrderPaid(order_id) => {
                info!(%order_id, "order paid");
            }
            Event::OrderPaymentFailed(order_id) => {
                warn!(%order_id, "order payment failed");
            }
            Event::OrderCompleted(order_id) => {
                info!(%order_id, "order completed");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event channel closed; stopping event loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderCreated(Uuid::new_v4()))
            .await
            .expect("send should succeed");

        assert!(matches!(rx.recv().await, Some(Event::OrderCreated(_))));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or return an error to the caller.
        sender.send_or_log(Event::CartCreated(Uuid::new_v4())).await;
    }
}
