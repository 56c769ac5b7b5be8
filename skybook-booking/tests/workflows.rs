use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use skybook_booking::{
    BookingOrchestrator, CustomerBookingRequest, GuestBookingRequest, InMemoryBookingRepository, ReconcileReport,
    Stores,
};
use skybook_core::events::BroadcastPublisher;
use skybook_core::flight::{ReleaseOutcome, ReserveOutcome};
use skybook_core::repository::{BookingRepository, FlightRepository, StoreError, StoreResult, Transition};
use skybook_core::{
    Booking, BookingCode, BookingError, BookingFilter, BookingRules, BookingStatus, CodeGenerator, CustomerFilter,
    CustomerProfile, Flight, FlightFilter, FlightStatus, NewFlight,
};
use skybook_inventory::InMemoryFlightRepository;
use uuid::Uuid;

/// Sleep long enough to miss any deadline the tests configure.
const STALL: Duration = Duration::from_millis(400);

/// Flight store whose releases can be switched off, and whose writes can be
/// made to commit but answer too late.
#[derive(Default)]
struct FlakyFlights {
    inner: InMemoryFlightRepository,
    fail_release: AtomicBool,
    stall_reserve: AtomicBool,
    stall_release: AtomicBool,
    releases: AtomicUsize,
}

#[async_trait]
impl FlightRepository for FlakyFlights {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        self.inner.get(id).await
    }

    async fn insert(&self, flight: &Flight) -> StoreResult<()> {
        self.inner.insert(flight).await
    }

    async fn search(&self, filter: &FlightFilter) -> StoreResult<Vec<Flight>> {
        self.inner.search(filter).await
    }

    async fn set_status(&self, id: Uuid, status: FlightStatus) -> StoreResult<Option<Flight>> {
        self.inner.set_status(id, status).await
    }

    async fn reserve_slots(&self, id: Uuid, hold_id: Uuid, count: u32) -> StoreResult<ReserveOutcome> {
        let outcome = self.inner.reserve_slots(id, hold_id, count).await?;
        if self.stall_reserve.load(Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
        Ok(outcome)
    }

    async fn release_slots(&self, id: Uuid, hold_id: Uuid, count: u32) -> StoreResult<ReleaseOutcome> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        let outcome = self.inner.release_slots(id, hold_id, count).await?;
        if let ReleaseOutcome::Released { .. } = outcome {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        if self.stall_release.load(Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
        Ok(outcome)
    }
}

/// Booking store whose inserts can be made to commit but answer too late.
#[derive(Default)]
struct SlowBookings {
    inner: InMemoryBookingRepository,
    stall_insert: AtomicBool,
}

#[async_trait]
impl BookingRepository for SlowBookings {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.inner.get(id).await
    }

    async fn insert(&self, booking: &Booking) -> StoreResult<()> {
        self.inner.insert(booking).await?;
        if self.stall_insert.load(Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
        Ok(())
    }

    async fn transition(&self, id: Uuid, from: BookingStatus, to: BookingStatus) -> StoreResult<Transition> {
        self.inner.transition(id, from, to).await
    }

    async fn search(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        self.inner.search(filter).await
    }
}

/// Hands out a scripted sequence of codes, then repeats the last one.
struct ScriptedCodes(Mutex<Vec<&'static str>>);

impl CodeGenerator for ScriptedCodes {
    fn generate(&self) -> BookingCode {
        let mut codes = self.0.lock().unwrap();
        let next = if codes.len() > 1 { codes.remove(0) } else { codes[0] };
        BookingCode::parse(next).unwrap()
    }
}

struct Harness {
    orchestrator: BookingOrchestrator,
    flights: Arc<FlakyFlights>,
    bookings: Arc<SlowBookings>,
}

fn harness() -> Harness {
    harness_with_timeout(1000)
}

fn harness_with_timeout(storage_timeout_ms: u64) -> Harness {
    let flights = Arc::new(FlakyFlights::default());
    let bookings = Arc::new(SlowBookings::default());
    let stores = Stores {
        flights: flights.clone(),
        bookings: bookings.clone(),
        ..Stores::in_memory()
    };
    let rules = BookingRules {
        storage_timeout_ms,
        ..Default::default()
    };
    Harness {
        orchestrator: BookingOrchestrator::new(stores, rules),
        flights,
        bookings,
    }
}

async fn flight(orchestrator: &BookingOrchestrator, capacity: u32) -> Uuid {
    orchestrator
        .inventory()
        .register_flight(NewFlight {
            name: "VN123".to_string(),
            origin: "HAN".to_string(),
            destination: "SGN".to_string(),
            departure: Utc::now(),
            capacity,
        })
        .await
        .unwrap()
        .id
}

async fn customer(orchestrator: &BookingOrchestrator, email: &str) -> Uuid {
    let profile = CustomerProfile {
        name: "Nguyen Van A".to_string(),
        email: Some(email.into()),
        ..Default::default()
    };
    orchestrator
        .directory()
        .find_or_create(&skybook_core::MatchKeys::from_profile(&profile), profile)
        .await
        .unwrap()
        .id
}

async fn available(orchestrator: &BookingOrchestrator, flight_id: Uuid) -> u32 {
    orchestrator.inventory().get_availability(flight_id).await.unwrap().available_slot
}

/// available + active booked == capacity
async fn assert_conserved(orchestrator: &BookingOrchestrator, flight_id: Uuid) {
    let flight = orchestrator.inventory().get_flight(flight_id).await.unwrap();
    let active: u32 = orchestrator
        .search_booking(&BookingFilter {
            flight_id: Some(flight_id),
            status: Some(BookingStatus::Active),
            ..Default::default()
        })
        .await
        .unwrap()
        .iter()
        .map(|b| b.booked_slot)
        .sum();
    assert_eq!(flight.available_slot + active, flight.capacity);
}

fn booking(customer_id: Uuid, flight_id: Uuid, slot: i32) -> CustomerBookingRequest {
    CustomerBookingRequest {
        customer_id,
        flight_id,
        slot,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_never_oversell() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 10).await;
    let customer_id = customer(&h.orchestrator, "race@x.com").await;

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let orchestrator = h.orchestrator.clone();
        tasks.push(tokio::spawn(async move {
            orchestrator.customer_booking(booking(customer_id, flight_id, 4)).await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(BookingError::InsufficientInventory { requested, .. }) => {
                assert_eq!(requested, 4);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!((succeeded, rejected), (2, 1));
    assert_eq!(available(&h.orchestrator, flight_id).await, 2);
    assert_conserved(&h.orchestrator, flight_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_small_bookings_fill_exactly_to_capacity() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 25).await;
    let customer_id = customer(&h.orchestrator, "crowd@x.com").await;

    let mut tasks = Vec::new();
    for i in 0..40 {
        let orchestrator = h.orchestrator.clone();
        let slot = (i % 3) + 1;
        tasks.push(tokio::spawn(async move {
            orchestrator
                .customer_booking(booking(customer_id, flight_id, slot))
                .await
                .map(|b| b.booked_slot)
        }));
    }

    let mut sold = 0;
    for task in tasks {
        if let Ok(slot) = task.await.unwrap() {
            sold += slot;
        }
    }

    assert!(sold <= 25);
    assert_eq!(available(&h.orchestrator, flight_id).await, 25 - sold);
    assert_conserved(&h.orchestrator, flight_id).await;
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 5).await;
    let customer_id = customer(&h.orchestrator, "b@x.com").await;

    let b = h.orchestrator.customer_booking(booking(customer_id, flight_id, 3)).await.unwrap();
    assert_eq!(available(&h.orchestrator, flight_id).await, 2);

    let cancelled = h.orchestrator.cancel_booking(b.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(available(&h.orchestrator, flight_id).await, 5);

    let again = h.orchestrator.cancel_booking(b.id).await.unwrap();
    assert_eq!(again.status, BookingStatus::Cancelled);
    assert_eq!(available(&h.orchestrator, flight_id).await, 5);
    assert_eq!(h.flights.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cancels_release_once() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 6).await;
    let customer_id = customer(&h.orchestrator, "c@x.com").await;
    let b = h.orchestrator.customer_booking(booking(customer_id, flight_id, 2)).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let orchestrator = h.orchestrator.clone();
        tasks.push(tokio::spawn(async move { orchestrator.cancel_booking(b.id).await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().status, BookingStatus::Cancelled);
    }

    assert_eq!(h.flights.releases.load(Ordering::SeqCst), 1);
    assert_eq!(available(&h.orchestrator, flight_id).await, 6);
}

#[tokio::test]
async fn guest_bookings_share_one_customer() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 10).await;

    let first = h
        .orchestrator
        .guest_booking(GuestBookingRequest {
            profile: CustomerProfile {
                name: "Tran Thi B".to_string(),
                email: Some("a@x.com".into()),
                ..Default::default()
            },
            flight_id,
            slot: 2,
        })
        .await
        .unwrap();
    let second = h
        .orchestrator
        .guest_booking(GuestBookingRequest {
            profile: CustomerProfile {
                name: "Someone Else".to_string(),
                email: Some("a@x.com".into()),
                ..Default::default()
            },
            flight_id,
            slot: 1,
        })
        .await
        .unwrap();

    assert_eq!(first.customer_id, second.customer_id);
    let customers = h.orchestrator.directory().search(&CustomerFilter::default()).await.unwrap();
    assert_eq!(customers.len(), 1);

    let history = h.orchestrator.booking_history(first.customer_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(available(&h.orchestrator, flight_id).await, 7);
}

#[tokio::test]
async fn guest_customer_survives_failed_reservation() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 1).await;

    let err = h
        .orchestrator
        .guest_booking(GuestBookingRequest {
            profile: CustomerProfile {
                name: "Le C".to_string(),
                phone: Some("+84900000000".into()),
                ..Default::default()
            },
            flight_id,
            slot: 3,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InsufficientInventory { available: 1, .. }));

    let customers = h.orchestrator.directory().search(&CustomerFilter::default()).await.unwrap();
    assert_eq!(customers.len(), 1);
    assert_eq!(available(&h.orchestrator, flight_id).await, 1);
}

#[tokio::test]
async fn non_positive_slot_has_no_side_effects() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 4).await;
    let customer_id = customer(&h.orchestrator, "d@x.com").await;

    for slot in [0, -3] {
        let err = h
            .orchestrator
            .customer_booking(booking(customer_id, flight_id, slot))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidArgument(_)));

        let err = h
            .orchestrator
            .guest_booking(GuestBookingRequest {
                profile: CustomerProfile {
                    name: "Ghost".to_string(),
                    email: Some("ghost@x.com".into()),
                    ..Default::default()
                },
                flight_id,
                slot,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidArgument(_)));
    }

    assert_eq!(available(&h.orchestrator, flight_id).await, 4);
    let customers = h.orchestrator.directory().search(&CustomerFilter::default()).await.unwrap();
    assert_eq!(customers.len(), 1);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 4).await;
    let customer_id = customer(&h.orchestrator, "e@x.com").await;

    assert!(matches!(
        h.orchestrator.customer_booking(booking(Uuid::new_v4(), flight_id, 1)).await,
        Err(BookingError::NotFound { .. })
    ));
    assert!(matches!(
        h.orchestrator.customer_booking(booking(customer_id, Uuid::new_v4(), 1)).await,
        Err(BookingError::NotFound { .. })
    ));
    assert!(matches!(
        h.orchestrator.cancel_booking(Uuid::new_v4()).await,
        Err(BookingError::NotFound { .. })
    ));
    assert!(matches!(
        h.orchestrator.booking_history(Uuid::new_v4()).await,
        Err(BookingError::NotFound { .. })
    ));
}

#[tokio::test]
async fn cancelled_flight_rejects_reservations() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 4).await;
    let customer_id = customer(&h.orchestrator, "f@x.com").await;
    h.orchestrator
        .inventory()
        .set_status(flight_id, FlightStatus::Cancelled)
        .await
        .unwrap();

    assert!(matches!(
        h.orchestrator.customer_booking(booking(customer_id, flight_id, 1)).await,
        Err(BookingError::NotFound { .. })
    ));
}

#[tokio::test]
async fn disabled_customer_cannot_book() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 4).await;
    let customer_id = customer(&h.orchestrator, "g@x.com").await;
    h.orchestrator.directory().disable(customer_id).await.unwrap();

    assert!(matches!(
        h.orchestrator.customer_booking(booking(customer_id, flight_id, 1)).await,
        Err(BookingError::InvalidArgument(_))
    ));
    assert_eq!(available(&h.orchestrator, flight_id).await, 4);
}

#[tokio::test]
async fn code_collision_retries_with_fresh_code() {
    let h = harness();
    let orchestrator = h
        .orchestrator
        .with_code_generator(Arc::new(ScriptedCodes(Mutex::new(vec!["VN_AAAAAA", "VN_AAAAAA", "VN_BBBBBB"]))));
    let flight_id = flight(&orchestrator, 6).await;
    let customer_id = customer(&orchestrator, "h@x.com").await;

    let first = orchestrator.customer_booking(booking(customer_id, flight_id, 1)).await.unwrap();
    let second = orchestrator.customer_booking(booking(customer_id, flight_id, 1)).await.unwrap();

    assert_eq!(first.code.as_str(), "VN_AAAAAA");
    assert_eq!(second.code.as_str(), "VN_BBBBBB");
    assert_eq!(available(&orchestrator, flight_id).await, 4);
}

#[tokio::test]
async fn code_exhaustion_rolls_back_reservation() {
    let h = harness();
    let orchestrator = h
        .orchestrator
        .with_code_generator(Arc::new(ScriptedCodes(Mutex::new(vec!["VN_SAME00"]))));
    let flight_id = flight(&orchestrator, 6).await;
    let customer_id = customer(&orchestrator, "i@x.com").await;

    orchestrator.customer_booking(booking(customer_id, flight_id, 2)).await.unwrap();
    let err = orchestrator
        .customer_booking(booking(customer_id, flight_id, 3))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::CodeGenerationExhausted { attempts: 5 }));
    assert_eq!(available(&orchestrator, flight_id).await, 4);
    assert_conserved(&orchestrator, flight_id).await;
}

#[tokio::test]
async fn failed_rollback_escalates() {
    let h = harness();
    let orchestrator = h
        .orchestrator
        .with_code_generator(Arc::new(ScriptedCodes(Mutex::new(vec!["VN_SAME01"]))));
    let flight_id = flight(&orchestrator, 6).await;
    let customer_id = customer(&orchestrator, "j@x.com").await;
    orchestrator.customer_booking(booking(customer_id, flight_id, 1)).await.unwrap();

    h.flights.fail_release.store(true, Ordering::SeqCst);
    let err = orchestrator
        .customer_booking(booking(customer_id, flight_id, 2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::ReconciliationRequired { booking_id: None, slot: 2, .. }
    ));
    assert_eq!(available(&orchestrator, flight_id).await, 3);

    h.flights.fail_release.store(false, Ordering::SeqCst);
    let report = orchestrator.reconciler().run_once().await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(available(&orchestrator, flight_id).await, 5);
    assert_conserved(&orchestrator, flight_id).await;
}

#[tokio::test]
async fn failed_cancel_release_is_reconciled_later() {
    let h = harness();
    let publisher = Arc::new(BroadcastPublisher::new(16));
    let mut events = publisher.subscribe();
    let orchestrator = h.orchestrator.clone().with_events(publisher);
    let flight_id = flight(&orchestrator, 5).await;
    let customer_id = customer(&orchestrator, "k@x.com").await;
    let b = orchestrator.customer_booking(booking(customer_id, flight_id, 3)).await.unwrap();
    assert_eq!(events.recv().await.unwrap().topic(), "booking.created");

    h.flights.fail_release.store(true, Ordering::SeqCst);
    let err = orchestrator.cancel_booking(b.id).await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::ReconciliationRequired { booking_id: Some(id), slot: 3, .. } if id == b.id
    ));
    assert_eq!(events.recv().await.unwrap().topic(), "inventory.release_stuck");

    // Booking stays cancelled, seats are stuck until reconciliation.
    assert_eq!(orchestrator.ledger().find_by_id(b.id).await.unwrap().status, BookingStatus::Cancelled);
    assert_eq!(available(&orchestrator, flight_id).await, 2);

    // A retried cancel does not release twice.
    assert_eq!(orchestrator.cancel_booking(b.id).await.unwrap().status, BookingStatus::Cancelled);

    let reconciler = orchestrator.reconciler();
    let report = reconciler.run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(available(&orchestrator, flight_id).await, 2);

    h.flights.fail_release.store(false, Ordering::SeqCst);
    let report = reconciler.run_once().await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(available(&orchestrator, flight_id).await, 5);
    assert_conserved(&orchestrator, flight_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_booking_gives_seats_back() {
    let h = harness();
    let flight_id = flight(&h.orchestrator, 4).await;
    let customer_id = customer(&h.orchestrator, "l@x.com").await;

    let orchestrator = h.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.customer_booking(booking(customer_id, flight_id, 2)).await });
    task.abort();
    let _ = task.await;

    // Whatever point the abort hit, the flight ends consistent with the ledger.
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let flight = h.orchestrator.inventory().get_flight(flight_id).await.unwrap();
        let booked: u32 = h
            .orchestrator
            .booking_history(customer_id)
            .await
            .unwrap()
            .iter()
            .filter(|b| b.is_active())
            .map(|b| b.booked_slot)
            .sum();
        if flight.available_slot + booked == flight.capacity {
            return;
        }
    }
    panic!("aborted booking left the flight inconsistent");
}

#[tokio::test]
async fn late_cancel_release_is_not_repeated_by_reconciler() {
    let h = harness_with_timeout(100);
    let flight_id = flight(&h.orchestrator, 10).await;
    let customer_id = customer(&h.orchestrator, "m@x.com").await;
    let first = h.orchestrator.customer_booking(booking(customer_id, flight_id, 3)).await.unwrap();

    // The release commits, but its answer misses the deadline.
    h.flights.stall_release.store(true, Ordering::SeqCst);
    let err = h.orchestrator.cancel_booking(first.id).await.unwrap_err();
    assert!(matches!(err, BookingError::ReconciliationRequired { booking_id: Some(id), .. } if id == first.id));
    h.flights.stall_release.store(false, Ordering::SeqCst);
    assert_eq!(available(&h.orchestrator, flight_id).await, 10);

    h.orchestrator.customer_booking(booking(customer_id, flight_id, 3)).await.unwrap();

    let report = h.orchestrator.reconciler().run_once().await.unwrap();
    assert_eq!(report, ReconcileReport { resolved: 1, failed: 0 });
    assert_eq!(available(&h.orchestrator, flight_id).await, 7);
    assert_eq!(h.flights.releases.load(Ordering::SeqCst), 1);
    assert_conserved(&h.orchestrator, flight_id).await;
}

#[tokio::test]
async fn late_reserve_is_reconciled() {
    let h = harness_with_timeout(100);
    let flight_id = flight(&h.orchestrator, 10).await;
    let customer_id = customer(&h.orchestrator, "n@x.com").await;

    // The reserve commits, but its answer misses the deadline.
    h.flights.stall_reserve.store(true, Ordering::SeqCst);
    let err = h
        .orchestrator
        .customer_booking(booking(customer_id, flight_id, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::StorageUnavailable(_)));
    h.flights.stall_reserve.store(false, Ordering::SeqCst);
    assert_eq!(available(&h.orchestrator, flight_id).await, 6);
    assert!(h.orchestrator.booking_history(customer_id).await.unwrap().is_empty());

    let report = h.orchestrator.reconciler().run_once().await.unwrap();
    assert_eq!(report, ReconcileReport { resolved: 1, failed: 0 });
    assert_eq!(available(&h.orchestrator, flight_id).await, 10);
    assert_conserved(&h.orchestrator, flight_id).await;

    let report = h.orchestrator.reconciler().run_once().await.unwrap();
    assert_eq!(report, ReconcileReport::default());
}

#[tokio::test]
async fn late_booking_write_is_kept() {
    let h = harness_with_timeout(100);
    let flight_id = flight(&h.orchestrator, 10).await;
    let customer_id = customer(&h.orchestrator, "o@x.com").await;

    // The insert commits, but its answer misses the deadline.
    h.bookings.stall_insert.store(true, Ordering::SeqCst);
    let booked = h
        .orchestrator
        .customer_booking(booking(customer_id, flight_id, 2))
        .await
        .unwrap();
    h.bookings.stall_insert.store(false, Ordering::SeqCst);

    assert_eq!(booked.status, BookingStatus::Active);
    assert_eq!(available(&h.orchestrator, flight_id).await, 8);
    assert_eq!(h.flights.releases.load(Ordering::SeqCst), 0);
    assert_conserved(&h.orchestrator, flight_id).await;

    h.orchestrator.cancel_booking(booked.id).await.unwrap();
    assert_eq!(available(&h.orchestrator, flight_id).await, 10);
}
