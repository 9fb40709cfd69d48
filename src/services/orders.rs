use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub items: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

/// A priced order line, snapshotted from the product at creation time.
struct PricedLine {
    product_id: Uuid,
    quantity: i32,
    price: Decimal,
    subtotal: Decimal,
}

/// Computes per-line subtotals and the order total from snapshot prices.
fn price_lines(lines: &[(Uuid, i32, Decimal)]) -> (Vec<PricedLine>, Decimal) {
    let mut total = Decimal::ZERO;
    let mut priced = Vec::with_capacity(lines.len());
    for (product_id, quantity, price) in lines {
        let subtotal = *price * Decimal::from(*quantity);
        total += subtotal;
        priced.push(PricedLine {
            product_id: *product_id,
            quantity: *quantity,
            price: *price,
            subtotal,
        });
    }
    (priced, total)
}

/// Service owning the Order + OrderItem lifecycle and total computation.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates an order with its items in one transaction. Prices are
    /// snapshotted from the products at this moment; the total is derived,
    /// never caller-supplied.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        // Load each product and run the advisory availability check before
        // anything is written.
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(
                    "quantity must be at least 1".to_string(),
                ));
            }

            let product =
                inventory::available_product(&txn, item.product_id, item.quantity).await?;
            lines.push((product.id, item.quantity, product.price));
        }

        let (priced, total_amount) = price_lines(&lines);

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            total_amount: Set(total_amount),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await?;

        let mut item_models = Vec::with_capacity(priced.len());
        for line in &priced {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price: Set(line.price),
                subtotal: Set(line.subtotal),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            item_models.push(item);
        }

        txn.commit().await?;

        info!(order_id = %order_id, total = %total_amount, "Order created");
        self.event_sender.send(Event::OrderCreated(order_id)).await;

        Ok(assemble_response(order_model, item_models))
    }

    /// Fetches an order; with an owner filter, foreign orders are
    /// indistinguishable from missing ones.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        owner: Option<Uuid>,
    ) -> Result<OrderResponse, ServiceError> {
        let mut query = OrderEntity::find_by_id(order_id);
        if let Some(owner) = owner {
            query = query.filter(order::Column::UserId.eq(owner));
        }

        let order = query
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(assemble_response(order, items))
    }

    /// Lists the owner's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let paginator = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, page_size);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.eq(order.id))
                .all(&*self.db)
                .await?;
            responses.push(assemble_response(order, items));
        }

        Ok(OrderListResponse {
            items: responses,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    /// Cancels a pending order. The Pending guard rides in the UPDATE's
    /// WHERE clause so concurrent transitions cannot both win.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        // Ownership check; also distinguishes NotFound from InvalidTransition.
        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if order.status.is_terminal() {
            return Err(ServiceError::InvalidTransition(
                "only pending orders can be canceled".to_string(),
            ));
        }

        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::Status,
                sea_orm::sea_query::Expr::value(OrderStatus::Canceled),
            )
            .col_expr(
                order::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(order_id = %order_id, "Cancel lost the race against another transition");
            return Err(ServiceError::InvalidTransition(
                "only pending orders can be canceled".to_string(),
            ));
        }

        info!(order_id = %order_id, "Order canceled");
        self.event_sender.send(Event::OrderCanceled(order_id)).await;

        self.get_order(order_id, Some(user_id)).await
    }

    /// Transitions Pending→Paid and decrements stock for every item, all on
    /// the caller's transaction. Any failed decrement aborts the whole
    /// operation, rolling the status change back with it.
    ///
    /// Returns the decremented (product, quantity) pairs so the caller can
    /// emit events once its transaction commits.
    pub async fn mark_as_paid<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<(Uuid, i32)>, ServiceError> {
        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::Status,
                sea_orm::sea_query::Expr::value(OrderStatus::Paid),
            )
            .col_expr(
                order::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let exists = OrderEntity::find_by_id(order_id).one(conn).await?.is_some();
            return Err(if exists {
                ServiceError::InvalidTransition("order is not in pending status".to_string())
            } else {
                ServiceError::NotFound("Order not found".to_string())
            });
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(conn)
            .await?;

        let mut decremented = Vec::with_capacity(items.len());
        for item in &items {
            inventory::reserve_and_decrement(conn, item.product_id, item.quantity).await?;
            decremented.push((item.product_id, item.quantity));
        }

        info!(order_id = %order_id, items = items.len(), "Order marked as paid");
        Ok(decremented)
    }
}

fn assemble_response(order: OrderModel, items: Vec<OrderItemModel>) -> OrderResponse {
    OrderResponse {
        id: order.id,
        user_id: order.user_id,
        total_amount: order.total_amount,
        status: order.status,
        items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                id: item.id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
                subtotal: item.subtotal,
            })
            .collect(),
        created_at: order.created_at,
        updated_at: order.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn totals_sum_snapshot_prices() {
        let lines = vec![
            (Uuid::new_v4(), 3, dec!(10.00)),
            (Uuid::new_v4(), 1, dec!(5.00)),
        ];
        let (priced, total) = price_lines(&lines);

        assert_eq!(total, dec!(35.00));
        assert_eq!(priced[0].subtotal, dec!(30.00));
        assert_eq!(priced[1].subtotal, dec!(5.00));
    }

    #[test]
    fn empty_line_set_totals_zero() {
        let (priced, total) = price_lines(&[]);
        assert!(priced.is_empty());
        assert_eq!(total, Decimal::ZERO);
    }

    proptest! {
        /// The order total always equals the sum of price × quantity over
        /// its lines, for any mix of quantities and 2-place prices.
        #[test]
        fn total_equals_sum_of_subtotals(
            lines in prop::collection::vec((1i32..=1000, 1i64..=100_000), 1..16)
        ) {
            let lines: Vec<(Uuid, i32, Decimal)> = lines
                .into_iter()
                .map(|(qty, cents)| (Uuid::new_v4(), qty, Decimal::new(cents, 2)))
                .collect();

            let (priced, total) = price_lines(&lines);

            let expected: Decimal = lines
                .iter()
                .map(|(_, qty, price)| *price * Decimal::from(*qty))
                .sum();
            prop_assert_eq!(total, expected);
            for (line, (_, qty, price)) in priced.iter().zip(&lines) {
                prop_assert_eq!(line.subtotal, *price * Decimal::from(*qty));
            }
        }
    }
}
