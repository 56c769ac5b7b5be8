use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub code: String,
    pub customer_id: Uuid,
    pub flight_id: Uuid,
    pub booked_slot: u32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub code: String,
    pub flight_id: Uuid,
    pub released_slot: u32,
    pub timestamp: i64,
}

/// A cancelled booking whose seats could not be handed back to inventory.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReleaseStuckEvent {
    pub booking_id: Option<Uuid>,
    pub flight_id: Uuid,
    pub slot: u32,
    pub reason: String,
    pub timestamp: i64,
}
