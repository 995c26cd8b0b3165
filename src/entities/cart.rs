use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shopping cart entity. One active cart per buyer (unique index on
/// `buyer_id`). Monetary columns are derived state: they are recomputed and
/// persisted on every read and mutation, never trusted as stale.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub buyer_id: Uuid,
    #[sea_orm(nullable)]
    pub address_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub courier: Option<String>,
    #[sea_orm(nullable)]
    pub courier_service: Option<String>,
    #[sea_orm(nullable)]
    pub courier_eta: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub courier_price: Decimal,
    #[sea_orm(nullable)]
    pub voucher_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub voucher_discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub voucher_cashback: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub service_fee: Decimal,
    pub use_coin: bool,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub coin_applied: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub total_payment: Decimal,
    #[sea_orm(nullable)]
    pub payment_method: Option<PaymentMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
    #[sea_orm(
        belongs_to = "super::voucher::Entity",
        from = "Column::VoucherId",
        to = "super::voucher::Column::Id"
    )]
    Voucher,
    #[sea_orm(
        belongs_to = "super::address::Entity",
        from = "Column::AddressId",
        to = "super::address::Column::Id"
    )]
    Address,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl Related<super::voucher::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Voucher.def()
    }
}

impl Related<super::address::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Address.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Supported payment methods at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "qris")]
    Qris,
    #[sea_orm(string_value = "bca_va")]
    BcaVa,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qris => "qris",
            Self::BcaVa => "bca_va",
        }
    }
}
