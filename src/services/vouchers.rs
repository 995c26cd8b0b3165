use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{voucher, Voucher, VoucherModel},
    errors::ServiceError,
};

/// Voucher lookup and eligibility checks.
#[derive(Clone)]
pub struct VoucherService {
    db: Arc<DbPool>,
}

impl VoucherService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Lists public vouchers whose validity window covers now.
    #[instrument(skip(self))]
    pub async fn list_public_active(&self) -> Result<Vec<VoucherModel>, ServiceError> {
        let now = Utc::now();
        let vouchers = Voucher::find()
            .filter(voucher::Column::IsPublic.eq(true))
            .filter(voucher::Column::StartsAt.lte(now))
            .filter(voucher::Column::EndsAt.gte(now))
            .order_by_asc(voucher::Column::EndsAt)
            .all(&*self.db)
            .await?;
        Ok(vouchers)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<VoucherModel, ServiceError> {
        Voucher::find()
            .filter(voucher::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Voucher {} not found", code)))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<VoucherModel, ServiceError> {
        Voucher::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Voucher {} not found", id)))
    }

    /// Checks the validity window and seller scope against the cart's seller.
    ///
    /// A seller-scoped voucher is only usable when the cart already contains
    /// that seller's items; a global voucher is usable by anyone.
    pub fn ensure_eligible(
        voucher: &VoucherModel,
        cart_seller_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if !voucher.is_active_at(now) {
            return Err(ServiceError::VoucherIneligible(
                "voucher is outside its validity window".to_string(),
            ));
        }

        if let (Some(scope), Some(cart_seller)) = (voucher.seller_id, cart_seller_id) {
            if scope != cart_seller {
                return Err(ServiceError::VoucherIneligible(
                    "voucher belongs to a different seller".to_string(),
                ));
            }
        }

        Ok(())
    }
}
