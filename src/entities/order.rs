use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::PaymentMethod;

/// Immutable order snapshot taken from the cart at checkout. Monetary fields
/// are copied verbatim and never recomputed; state advances only through the
/// append-only status log and the `is_paid` flag flipped by the payment
/// webhook.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub invoice_number: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub address_id: Uuid,
    pub courier: String,
    pub courier_service: String,
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
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub coin_applied: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub total_payment: Decimal,
    pub payment_method: PaymentMethod,
    #[sea_orm(nullable)]
    pub payment_reference: Option<String>,
    #[sea_orm(nullable)]
    pub payment_expires_at: Option<DateTime<Utc>>,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::order_status::Entity")]
    OrderStatuses,
    #[sea_orm(
        belongs_to = "super::seller::Entity",
        from = "Column::SellerId",
        to = "super::seller::Column::Id"
    )]
    Seller,
    #[sea_orm(
        belongs_to = "super::address::Entity",
        from = "Column::AddressId",
        to = "super::address::Column::Id"
    )]
    Address,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::order_status::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderStatuses.def()
    }
}

impl Related<super::seller::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Seller.def()
    }
}

impl Related<super::address::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Address.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
