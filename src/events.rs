use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Domain events emitted by the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: String,
        user_email: String,
        total: Decimal,
        item_count: usize,
    },
    ProductCreated(i32),
    ProductUpdated(i32),
    ProductDeleted(i32),
    OrderDeleted(String),
    UserRegistered {
        user_id: i32,
        email: String,
    },
    UserDeleted(i32),
}

/// Cloneable handle for publishing events onto the processing channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is
    /// closed. Event delivery is best-effort and never blocks a request's
    /// outcome.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Creates an event channel with the given capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Consumes events off the channel; currently a structured-logging sink.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                user_email,
                total,
                item_count,
            } => info!(
                order_id = %order_id,
                user_email = %user_email,
                %total,
                item_count,
                "order placed"
            ),
            other => info!(event = ?other, "event processed"),
        }
    }
    info!("Event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_does_not_error_when_receiver_dropped() {
        let (sender, rx) = channel(4);
        drop(rx);
        // must not panic or return an error path to callers
        sender.send_or_log(Event::ProductDeleted(1)).await;
    }

    #[tokio::test]
    async fn events_flow_through_channel() {
        let (sender, mut rx) = channel(4);
        sender
            .send(Event::UserRegistered {
                user_id: 7,
                email: "a@b.c".into(),
            })
            .await
            .unwrap();
        match rx.recv().await {
            Some(Event::UserRegistered { user_id, .. }) => assert_eq!(user_id, 7),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
