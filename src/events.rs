use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the services. Consumers are observers only;
/// nothing in the request path depends on delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderCanceled(Uuid),
    OrderPaid(Uuid),
    PaymentCreated {
        payment_id: Uuid,
        order_id: Uuid,
        provider: String,
    },
    PaymentSucceeded(Uuid),
    PaymentFailed(Uuid),
    StockDeducted {
        product_id: Uuid,
        quantity: i32,
    },
    ProductCreated(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, logging rather than failing the request when the
    /// consumer has fallen behind or gone away.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "Failed to publish event");
        }
    }
}

/// Drains the event channel, logging each event. Runs for the lifetime of
/// the process.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "Event processed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        EventSender::new(tx).send(Event::OrderCreated(Uuid::new_v4())).await;
    }
}
