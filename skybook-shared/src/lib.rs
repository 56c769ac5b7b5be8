pub mod models;
pub mod pii;

pub use models::events::{BookingCancelledEvent, BookingCreatedEvent, ReleaseStuckEvent};
pub use pii::Masked;
