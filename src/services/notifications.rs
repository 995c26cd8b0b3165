use async_trait::async_trait;
use tracing::info;

use crate::{
    entities::{OrderModel, SellerModel},
    errors::ServiceError,
};

/// Outbound "new paid order" notification to the seller. Fire-and-forget:
/// callers log failures and never abort the surrounding transition.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn notify_seller_new_order(
        &self,
        seller: &SellerModel,
        order: &OrderModel,
    ) -> Result<(), ServiceError>;
}

/// Default sender that records the notification in the log. The real mail
/// delivery path is owned by the notification collaborator service.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn notify_seller_new_order(
        &self,
        seller: &SellerModel,
        order: &OrderModel,
    ) -> Result<(), ServiceError> {
        info!(
            seller_email = %seller.email,
            invoice = %order.invoice_number,
            "notifying seller of new paid order"
        );
        Ok(())
    }
}
