use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Voucher definition. A null `seller_id` means the voucher is global;
/// otherwise it only applies to carts whose items belong to that seller.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    #[sea_orm(nullable)]
    pub seller_id: Option<Uuid>,
    pub kind: VoucherKind,
    pub value_type: VoucherValueType,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))", nullable)]
    pub max_amount: Option<Decimal>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_public: bool,
}

impl Model {
    /// Whether the voucher's validity window covers `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && self.ends_at >= now
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Discount vouchers reduce the payable total; cashback vouchers accrue a
/// separate amount credited to the buyer's coin balance after completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum VoucherKind {
    #[sea_orm(string_value = "discount")]
    Discount,
    #[sea_orm(string_value = "cashback")]
    Cashback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum VoucherValueType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}
