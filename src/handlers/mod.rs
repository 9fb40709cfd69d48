pub mod common;
pub mod orders;
pub mod payments;
pub mod products;

use std::sync::Arc;

use crate::{
    db::DbPool,
    events::EventSender,
    payment_providers::GatewayRegistry,
    services::{orders::OrderService, payments::PaymentService, products::ProductService},
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer wired once at startup and shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub products: Arc<ProductService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        registry: Arc<GatewayRegistry>,
        event_sender: EventSender,
        pending_timeout_secs: u64,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            registry,
            orders.clone(),
            event_sender.clone(),
            pending_timeout_secs,
        ));
        let products = Arc::new(ProductService::new(db, event_sender));

        Self {
            orders,
            payments,
            products,
        }
    }
}
