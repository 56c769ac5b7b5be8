pub mod booking;
pub mod code;
pub mod customer;
pub mod deadline;
pub mod events;
pub mod flight;
pub mod repository;
pub mod rules;

pub use booking::{Booking, BookingFilter, BookingStatus};
pub use code::{BookingCode, CodeGenerator, RandomCodeGenerator};
pub use customer::{Customer, CustomerFilter, CustomerPatch, CustomerProfile, CustomerStatus, MatchKey, MatchKeys};
pub use flight::{Availability, Flight, FlightFilter, FlightStatus, NewFlight};
pub use repository::{ConflictKey, StoreError, StoreResult};
pub use rules::BookingRules;

use uuid::Uuid;

/// Error taxonomy shared by every booking workflow.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient inventory on flight {flight_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        flight_id: Uuid,
        requested: u32,
        available: u32,
    },

    #[error("Conflict on {0}")]
    Conflict(String),

    #[error("Could not mint a unique booking code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },

    #[error("Reconciliation required: {slot} slot(s) on flight {flight_id} were not released: {reason}")]
    ReconciliationRequired {
        booking_id: Option<Uuid>,
        flight_id: Uuid,
        slot: u32,
        reason: String,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Transient faults. The failed write may still have been applied, so
    /// the caller cannot assume either outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::StorageUnavailable(_))
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(key) => BookingError::Conflict(key.to_string()),
            StoreError::Unavailable(msg) => BookingError::StorageUnavailable(msg),
            StoreError::Corrupt(msg) => BookingError::StorageUnavailable(format!("corrupt record: {}", msg)),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: BookingError = StoreError::Conflict(ConflictKey::BookingCode).into();
        assert!(matches!(err, BookingError::Conflict(ref key) if key == "booking code"));

        let err: BookingError = StoreError::Unavailable("pool timed out".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let id = Uuid::nil();
        let err = BookingError::not_found("flight", id);
        assert_eq!(err.to_string(), format!("flight not found: {}", id));
    }
}
