//! The stock ledger: sole authority over `products.stock`.
//!
//! Availability is checked advisorily at order-creation time and bindingly
//! at decrement time; nothing in between holds a reservation. Both entry
//! points run on the caller's connection so they participate in whatever
//! transaction surrounds them.

use crate::{
    entities::product::{self, Entity as ProductEntity, Model as ProductModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::warn;
use uuid::Uuid;

/// Loads a product and runs the advisory availability check: the product
/// must exist, be sellable and hold at least `quantity` units. Non-binding:
/// stock may be taken by a competing order before payment completes.
///
/// Returns the product so callers can snapshot its price in the same read.
pub async fn available_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<ProductModel, ServiceError> {
    let product = ProductEntity::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

    if !product.is_in_stock(quantity) {
        return Err(ServiceError::InsufficientStock(format!(
            "insufficient stock for product: {}",
            product.name
        )));
    }

    Ok(product)
}

/// Atomically checks availability and decrements stock in one guarded
/// UPDATE. Zero affected rows means another transaction took the stock
/// first; the caller must fail rather than oversell.
pub async fn reserve_and_decrement<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = ProductEntity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!(product_id = %product_id, quantity, "Stock decrement refused");
        return Err(ServiceError::InsufficientStock(format!(
            "insufficient stock for product {product_id}"
        )));
    }

    Ok(())
}
