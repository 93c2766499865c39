use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Events emitted by the order and payment services after commit.
/// Delivery is best-effort; a failed send never fails the operation
/// that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentStatusUpdated {
        order_id: Uuid,
        payment_status: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Background task draining the event channel. Runs until the channel closes.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "Processing order created event");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Processing order status change event"
                );
            }
            Event::PaymentStatusUpdated {
                order_id,
                payment_status,
            } => {
                info!(
                    order_id = %order_id,
                    payment_status = %payment_status,
                    "Processing payment status update event"
                );
            }
        }
    }
    info!("Event channel closed, stopping event processor");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::OrderCreated(Uuid::new_v4())).await.is_err());
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let id = Uuid::new_v4();

        sender.send(Event::OrderCreated(id)).await.unwrap();
        sender
            .send(Event::PaymentStatusUpdated {
                order_id: id,
                payment_status: "pagado".into(),
            })
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(Event::OrderCreated(got)) if got == id));
        assert!(matches!(
            rx.recv().await,
            Some(Event::PaymentStatusUpdated { order_id, .. }) if order_id == id
        ));
    }
}
