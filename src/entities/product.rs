use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Advisory availability check: the product must be sellable and hold
    /// at least `quantity` units. The binding check happens at decrement
    /// time in the stock ledger.
    pub fn is_in_stock(&self, quantity: i32) -> bool {
        self.status == ProductStatus::Active && self.stock >= quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(stock: i32, status: ProductStatus) -> Model {
        Model {
            id: Uuid::new_v4(),
            sku: "SKU-1".into(),
            name: "Widget".into(),
            description: None,
            price: dec!(10.00),
            stock,
            status,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn in_stock_requires_active_status_and_quantity() {
        assert!(product(5, ProductStatus::Active).is_in_stock(5));
        assert!(!product(4, ProductStatus::Active).is_in_stock(5));
        assert!(!product(5, ProductStatus::Inactive).is_in_stock(1));
    }
}
