use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product read model, owned by the catalog service. The cart core reads
/// pricing, stock, and weight from it; the only write path back is the
/// stock decrement applied when an order is paid.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))", nullable)]
    pub price_sale: Option<Decimal>,
    pub stock: i32,
    pub weight_grams: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Effective unit price: the sale price wins when set and positive.
    pub fn unit_price(&self) -> Decimal {
        match self.price_sale {
            Some(sale) if sale > Decimal::ZERO => sale,
            _ => self.price,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::seller::Entity",
        from = "Column::SellerId",
        to = "super::seller::Column::Id"
    )]
    Seller,
}

impl Related<super::seller::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Seller.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
