use std::sync::Arc;
use std::time::Duration;

use skybook_core::deadline::within;
use skybook_core::repository::{BookingRepository, ConflictKey, StoreError, Transition};
use skybook_core::{Booking, BookingCode, BookingError, BookingFilter, BookingResult, BookingStatus};
use tracing::debug;
use uuid::Uuid;

/// Result of a status update.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub booking: Booking,
    /// True only for the call that actually moved the booking. Side effects
    /// tied to the transition (seat release) key off this flag.
    pub changed: bool,
}

/// Owns booking records: creation, status transitions and queries.
#[derive(Clone)]
pub struct BookingLedger {
    bookings: Arc<dyn BookingRepository>,
    timeout: Duration,
}

impl BookingLedger {
    pub fn new(bookings: Arc<dyn BookingRepository>, timeout: Duration) -> Self {
        Self { bookings, timeout }
    }

    /// Insert an Active booking under `id`. A duplicate code fails with
    /// `Conflict`.
    pub async fn create(
        &self,
        id: Uuid,
        customer_id: Uuid,
        flight_id: Uuid,
        booked_slot: u32,
        code: BookingCode,
    ) -> BookingResult<Booking> {
        self.try_create(id, customer_id, flight_id, booked_slot, code)
            .await?
            .ok_or_else(|| BookingError::Conflict(ConflictKey::BookingCode.to_string()))
    }

    /// Like [`BookingLedger::create`], but a code collision comes back as
    /// `Ok(None)` so the caller can retry with a fresh code.
    pub async fn try_create(
        &self,
        id: Uuid,
        customer_id: Uuid,
        flight_id: Uuid,
        booked_slot: u32,
        code: BookingCode,
    ) -> BookingResult<Option<Booking>> {
        if booked_slot == 0 {
            return Err(BookingError::InvalidArgument("booked slot must be positive".into()));
        }

        let booking = Booking::new(id, customer_id, flight_id, booked_slot, code);
        let written = within(self.timeout, "insert_booking", async {
            match self.bookings.insert(&booking).await {
                Ok(()) => Ok(true),
                Err(StoreError::Conflict(ConflictKey::BookingCode)) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await?;

        if !written {
            debug!(code = %booking.code, "Booking code already taken");
            return Ok(None);
        }
        debug!(booking_id = %booking.id, code = %booking.code, "Booking written");
        Ok(Some(booking))
    }

    pub async fn find_by_id(&self, id: Uuid) -> BookingResult<Booking> {
        within(self.timeout, "get_booking", self.bookings.get(id))
            .await?
            .ok_or_else(|| BookingError::not_found("booking", id))
    }

    /// Idempotent: a booking already in `new_status` comes back unchanged.
    pub async fn update_status(&self, id: Uuid, new_status: BookingStatus) -> BookingResult<StatusChange> {
        let current = self.find_by_id(id).await?;
        if current.status == new_status {
            return Ok(StatusChange {
                booking: current,
                changed: false,
            });
        }

        let transition = within(
            self.timeout,
            "transition_booking",
            self.bookings.transition(id, current.status, new_status),
        )
        .await?;

        match transition {
            Transition::Applied(booking) => Ok(StatusChange { booking, changed: true }),
            Transition::Unchanged(booking) => {
                debug!(booking_id = %id, status = booking.status.as_str(), "Status moved concurrently");
                Ok(StatusChange {
                    booking,
                    changed: false,
                })
            }
            Transition::Missing => Err(BookingError::not_found("booking", id)),
        }
    }

    pub async fn search(&self, filter: &BookingFilter) -> BookingResult<Vec<Booking>> {
        within(self.timeout, "search_bookings", self.bookings.search(filter)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBookingRepository;
    use skybook_core::{CodeGenerator, RandomCodeGenerator};

    fn ledger() -> BookingLedger {
        BookingLedger::new(Arc::new(InMemoryBookingRepository::new()), Duration::from_secs(1))
    }

    async fn create(ledger: &BookingLedger, customer_id: Uuid, flight_id: Uuid, slot: u32) -> Booking {
        ledger
            .create(Uuid::new_v4(), customer_id, flight_id, slot, RandomCodeGenerator.generate())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_booking_lifecycle() {
        let ledger = ledger();
        let booking = ledger
            .create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 3, RandomCodeGenerator.generate())
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Active);

        let change = ledger.update_status(booking.id, BookingStatus::Cancelled).await.unwrap();
        assert!(change.changed);
        assert_eq!(change.booking.status, BookingStatus::Cancelled);

        let again = ledger.update_status(booking.id, BookingStatus::Cancelled).await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.booking.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_duplicate_code_conflicts() {
        let ledger = ledger();
        let code = BookingCode::parse("VN_dup001").unwrap();
        ledger
            .create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 1, code.clone())
            .await
            .unwrap();

        let err = ledger
            .create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 1, code)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let retry = ledger
            .try_create(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                1,
                BookingCode::parse("VN_dup001").unwrap(),
            )
            .await
            .unwrap();
        assert!(retry.is_none());
    }

    #[tokio::test]
    async fn test_unknown_booking_is_not_found() {
        let ledger = ledger();
        assert!(matches!(
            ledger.find_by_id(Uuid::new_v4()).await,
            Err(BookingError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.update_status(Uuid::new_v4(), BookingStatus::Cancelled).await,
            Err(BookingError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_filters_are_conjunctive() {
        let ledger = ledger();
        let customer = Uuid::new_v4();
        let flight_a = Uuid::new_v4();
        let flight_b = Uuid::new_v4();

        let a = create(&ledger, customer, flight_a, 1).await;
        create(&ledger, customer, flight_b, 2).await;
        create(&ledger, Uuid::new_v4(), flight_a, 1).await;
        ledger.update_status(a.id, BookingStatus::Cancelled).await.unwrap();

        assert_eq!(ledger.search(&BookingFilter::default()).await.unwrap().len(), 3);
        assert_eq!(ledger.search(&BookingFilter::for_customer(customer)).await.unwrap().len(), 2);

        let filter = BookingFilter {
            customer_id: Some(customer),
            flight_id: Some(flight_a),
            status: Some(BookingStatus::Active),
            ..Default::default()
        };
        assert!(ledger.search(&filter).await.unwrap().is_empty());

        let by_code = BookingFilter {
            code: Some(a.code.to_string()),
            ..Default::default()
        };
        let found = ledger.search(&by_code).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }
}
