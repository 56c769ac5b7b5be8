use async_trait::async_trait;
use serde::Serialize;
use skybook_shared::{BookingCancelledEvent, BookingCreatedEvent, ReleaseStuckEvent};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum BookingEvent {
    Created(BookingCreatedEvent),
    Cancelled(BookingCancelledEvent),
    ReleaseStuck(ReleaseStuckEvent),
}

impl BookingEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEvent::Created(_) => "booking.created",
            BookingEvent::Cancelled(_) => "booking.cancelled",
            BookingEvent::ReleaseStuck(_) => "inventory.release_stuck",
        }
    }

    pub fn key(&self) -> String {
        match self {
            BookingEvent::Created(e) => e.booking_id.to_string(),
            BookingEvent::Cancelled(e) => e.booking_id.to_string(),
            BookingEvent::ReleaseStuck(e) => e.booking_id.unwrap_or(e.flight_id).to_string(),
        }
    }
}

/// Outbound notification of ledger changes. Delivery is best effort.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// In-process fan-out, for subscribers living in the same binary.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<BookingEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // No subscribers is not an error.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}
