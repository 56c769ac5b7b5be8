use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use skybook_core::deadline::within;
use skybook_core::events::{BookingEvent, EventPublisher};
use skybook_core::repository::{BookingRepository, CustomerRepository, FlightRepository, ReleaseBacklog, StuckRelease};
use skybook_core::{
    Booking, BookingError, BookingFilter, BookingResult, BookingRules, BookingStatus, CodeGenerator, Customer,
    CustomerPatch, CustomerProfile, MatchKeys, RandomCodeGenerator,
};
use skybook_inventory::{FlightInventory, SeatHold};
use skybook_shared::{BookingCancelledEvent, BookingCreatedEvent, ReleaseStuckEvent};
use tracing::{debug, error, info, warn, Instrument, Span};
use uuid::Uuid;

use crate::directory::CustomerDirectory;
use crate::ledger::BookingLedger;
use crate::reconcile::Reconciler;

/// Storage handles the orchestrator is wired against.
#[derive(Clone)]
pub struct Stores {
    pub customers: Arc<dyn CustomerRepository>,
    pub flights: Arc<dyn FlightRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub backlog: Arc<dyn ReleaseBacklog>,
}

/// Where a booking is in its workflow. Recorded on the request span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStage {
    Requested,
    Reserving,
    Reserved,
    Persisting,
    Active,
    RolledBack,
    Cancelling,
    Cancelled,
}

impl BookingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStage::Requested => "requested",
            BookingStage::Reserving => "reserving",
            BookingStage::Reserved => "reserved",
            BookingStage::Persisting => "persisting",
            BookingStage::Active => "active",
            BookingStage::RolledBack => "rolled_back",
            BookingStage::Cancelling => "cancelling",
            BookingStage::Cancelled => "cancelled",
        }
    }
}

fn enter(stage: BookingStage) {
    Span::current().record("stage", stage.as_str());
    debug!(stage = stage.as_str(), "Booking stage");
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerBookingRequest {
    pub customer_id: Uuid,
    pub flight_id: Uuid,
    pub slot: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuestBookingRequest {
    #[serde(flatten)]
    pub profile: CustomerProfile,
    pub flight_id: Uuid,
    pub slot: i32,
}

fn positive_slot(slot: i32) -> BookingResult<u32> {
    u32::try_from(slot)
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| BookingError::InvalidArgument(format!("slot must be positive, got {}", slot)))
}

/// Coordinates directory, inventory and ledger for every booking workflow.
///
/// Holds no per-request state; cloning is cheap and clones share storage.
#[derive(Clone)]
pub struct BookingOrchestrator {
    directory: CustomerDirectory,
    inventory: FlightInventory,
    ledger: BookingLedger,
    backlog: Arc<dyn ReleaseBacklog>,
    codes: Arc<dyn CodeGenerator>,
    events: Option<Arc<dyn EventPublisher>>,
    rules: BookingRules,
}

impl BookingOrchestrator {
    pub fn new(stores: Stores, rules: BookingRules) -> Self {
        let timeout = rules.storage_timeout();
        Self {
            directory: CustomerDirectory::new(stores.customers, timeout, rules.identity_attempts),
            inventory: FlightInventory::new(stores.flights, timeout),
            ledger: BookingLedger::new(stores.bookings, timeout),
            backlog: stores.backlog,
            codes: Arc::new(RandomCodeGenerator),
            events: None,
            rules,
        }
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn directory(&self) -> &CustomerDirectory {
        &self.directory
    }

    pub fn inventory(&self) -> &FlightInventory {
        &self.inventory
    }

    pub fn ledger(&self) -> &BookingLedger {
        &self.ledger
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    /// Worker retrying the releases this orchestrator could not complete.
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.inventory.clone(),
            self.ledger.clone(),
            self.backlog.clone(),
            self.rules.storage_timeout(),
            self.rules.reconcile_batch,
        )
    }

    /// Book seats for a known customer.
    #[tracing::instrument(
        skip(self, req),
        fields(customer_id = %req.customer_id, flight_id = %req.flight_id, slot = req.slot, stage = tracing::field::Empty)
    )]
    pub async fn customer_booking(&self, req: CustomerBookingRequest) -> BookingResult<Booking> {
        enter(BookingStage::Requested);
        let slot = positive_slot(req.slot)?;
        let customer = self.directory.get(req.customer_id).await?;
        ensure_active(&customer)?;
        self.book(customer.id, req.flight_id, slot).await
    }

    /// Book seats for a guest, resolving or creating their customer record
    /// first. The customer is kept even if the booking itself fails.
    #[tracing::instrument(
        skip(self, req),
        fields(flight_id = %req.flight_id, slot = req.slot, customer_id = tracing::field::Empty, stage = tracing::field::Empty)
    )]
    pub async fn guest_booking(&self, req: GuestBookingRequest) -> BookingResult<Booking> {
        enter(BookingStage::Requested);
        let slot = positive_slot(req.slot)?;
        let keys = MatchKeys::from_profile(&req.profile);
        let customer = self.directory.find_or_create(&keys, req.profile).await?;
        Span::current().record("customer_id", tracing::field::display(customer.id));
        ensure_active(&customer)?;
        self.book(customer.id, req.flight_id, slot).await
    }

    async fn book(&self, customer_id: Uuid, flight_id: Uuid, slot: u32) -> BookingResult<Booking> {
        // Reservation onwards runs detached: a caller that goes away mid-way
        // cannot leave seats taken without a booking.
        let this = self.clone();
        let task = async move { this.reserve_and_persist(customer_id, flight_id, slot).await };
        tokio::spawn(task.instrument(Span::current()))
            .await
            .map_err(|e| BookingError::StorageUnavailable(format!("booking task aborted: {}", e)))?
    }

    async fn reserve_and_persist(&self, customer_id: Uuid, flight_id: Uuid, slot: u32) -> BookingResult<Booking> {
        enter(BookingStage::Reserving);
        // The booking id doubles as the hold key, so rollback, cancellation
        // and reconciliation all release these seats under the same key.
        let booking_id = Uuid::new_v4();
        let hold = match self.inventory.reserve(flight_id, booking_id, slot).await {
            Ok(hold) => hold,
            Err(e) if e.is_retryable() => {
                // The seats may have been taken anyway; leave the hold for
                // the reconciler to settle.
                self.park(&StuckRelease::new(booking_id, None, flight_id, slot, e.to_string()))
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        enter(BookingStage::Reserved);
        self.persist(customer_id, hold).await
    }

    async fn persist(&self, customer_id: Uuid, hold: SeatHold) -> BookingResult<Booking> {
        enter(BookingStage::Persisting);
        let cause = match self
            .write_with_fresh_code(hold.id(), customer_id, hold.flight_id(), hold.count())
            .await
        {
            Ok(booking) => return self.activate(hold, booking).await,
            Err(cause) => cause,
        };
        if !cause.is_retryable() {
            return self.roll_back(hold, cause).await;
        }

        // The insert may have landed even though its acknowledgement did not.
        match self.ledger.find_by_id(hold.id()).await {
            Ok(booking) => {
                info!(booking_id = %booking.id, "Booking write landed despite error: {}", cause);
                self.activate(hold, booking).await
            }
            Err(BookingError::NotFound { .. }) => self.roll_back(hold, cause).await,
            Err(lookup) => {
                let (hold_id, flight_id, slot) = (hold.id(), hold.flight_id(), hold.count());
                hold.defer();
                let reason = format!("booking write unconfirmed: {}; lookup failed: {}", cause, lookup);
                Err(self.escalate(hold_id, None, flight_id, slot, reason).await)
            }
        }
    }

    async fn activate(&self, hold: SeatHold, booking: Booking) -> BookingResult<Booking> {
        hold.confirm();
        enter(BookingStage::Active);
        info!(booking_id = %booking.id, code = %booking.code, "Booking confirmed");
        self.publish(BookingEvent::Created(BookingCreatedEvent {
            booking_id: booking.id,
            code: booking.code.to_string(),
            customer_id: booking.customer_id,
            flight_id: booking.flight_id,
            booked_slot: booking.booked_slot,
            timestamp: Utc::now().timestamp(),
        }))
        .await;
        Ok(booking)
    }

    /// Bounded retry on booking code collisions.
    async fn write_with_fresh_code(
        &self,
        booking_id: Uuid,
        customer_id: Uuid,
        flight_id: Uuid,
        slot: u32,
    ) -> BookingResult<Booking> {
        let attempts = self.rules.code_attempts.max(1);
        for attempt in 1..=attempts {
            let code = self.codes.generate();
            match self.ledger.try_create(booking_id, customer_id, flight_id, slot, code).await? {
                Some(booking) => return Ok(booking),
                None => debug!(attempt, "Booking code collision, regenerating"),
            }
        }
        Err(BookingError::CodeGenerationExhausted { attempts })
    }

    async fn roll_back(&self, hold: SeatHold, cause: BookingError) -> BookingResult<Booking> {
        let (hold_id, flight_id, slot) = (hold.id(), hold.flight_id(), hold.count());
        warn!(flight_id = %flight_id, slot, "Booking failed after reservation, releasing seats: {}", cause);

        match hold.release().await {
            Ok(_) => {
                enter(BookingStage::RolledBack);
                Err(cause)
            }
            Err(release_err) => Err(self.escalate(hold_id, None, flight_id, slot, release_err.to_string()).await),
        }
    }

    /// Cancel a booking and hand its seats back. Cancelling an already
    /// cancelled booking returns it unchanged and releases nothing.
    #[tracing::instrument(skip(self), fields(stage = tracing::field::Empty))]
    pub async fn cancel_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self.ledger.find_by_id(booking_id).await?;
        if booking.status == BookingStatus::Cancelled {
            debug!("Booking already cancelled");
            return Ok(booking);
        }

        let this = self.clone();
        tokio::spawn(async move { this.settle_cancellation(booking_id).await }.instrument(Span::current()))
            .await
            .map_err(|e| BookingError::StorageUnavailable(format!("cancellation task aborted: {}", e)))?
    }

    async fn settle_cancellation(&self, booking_id: Uuid) -> BookingResult<Booking> {
        enter(BookingStage::Cancelling);
        let change = self.ledger.update_status(booking_id, BookingStatus::Cancelled).await?;
        let booking = change.booking;
        if !change.changed {
            debug!("Lost cancellation race; seats released by the winner");
            return Ok(booking);
        }

        if let Err(e) = self
            .inventory
            .release(booking.flight_id, booking.id, booking.booked_slot)
            .await
        {
            return Err(self
                .escalate(booking.id, Some(booking.id), booking.flight_id, booking.booked_slot, e.to_string())
                .await);
        }

        enter(BookingStage::Cancelled);
        info!(flight_id = %booking.flight_id, slot = booking.booked_slot, "Booking cancelled");
        self.publish(BookingEvent::Cancelled(BookingCancelledEvent {
            booking_id: booking.id,
            code: booking.code.to_string(),
            flight_id: booking.flight_id,
            released_slot: booking.booked_slot,
            timestamp: Utc::now().timestamp(),
        }))
        .await;
        Ok(booking)
    }

    /// Park a release that failed so the reconciler can retry it.
    async fn escalate(
        &self,
        hold_id: Uuid,
        booking_id: Option<Uuid>,
        flight_id: Uuid,
        slot: u32,
        reason: String,
    ) -> BookingError {
        error!(
            booking_id = ?booking_id,
            flight_id = %flight_id,
            slot,
            "Seat release failed, queued for reconciliation: {}",
            reason
        );

        self.park(&StuckRelease::new(hold_id, booking_id, flight_id, slot, reason.clone()))
            .await;

        self.publish(BookingEvent::ReleaseStuck(ReleaseStuckEvent {
            booking_id,
            flight_id,
            slot,
            reason: reason.clone(),
            timestamp: Utc::now().timestamp(),
        }))
        .await;

        BookingError::ReconciliationRequired {
            booking_id,
            flight_id,
            slot,
            reason,
        }
    }

    async fn park(&self, stuck: &StuckRelease) {
        match within(self.rules.storage_timeout(), "push_stuck_release", self.backlog.push(stuck)).await {
            Ok(()) => warn!(
                hold_id = %stuck.hold_id,
                flight_id = %stuck.flight_id,
                slot = stuck.slot,
                "Hold parked for reconciliation"
            ),
            Err(e) => error!(
                hold_id = %stuck.hold_id,
                flight_id = %stuck.flight_id,
                slot = stuck.slot,
                "Could not record stuck release: {}",
                e
            ),
        }
    }

    pub async fn search_booking(&self, filter: &BookingFilter) -> BookingResult<Vec<Booking>> {
        self.ledger.search(filter).await
    }

    /// Every booking of one customer, newest first.
    pub async fn booking_history(&self, customer_id: Uuid) -> BookingResult<Vec<Booking>> {
        self.directory.get(customer_id).await?;
        self.ledger.search(&BookingFilter::for_customer(customer_id)).await
    }

    pub async fn update_customer(&self, customer_id: Uuid, patch: CustomerPatch) -> BookingResult<Customer> {
        self.directory.update(customer_id, patch).await
    }

    async fn publish(&self, event: BookingEvent) {
        let Some(events) = &self.events else {
            return;
        };
        match tokio::time::timeout(self.rules.storage_timeout(), events.publish(&event)).await {
            Ok(Ok(())) => debug!(topic = event.topic(), key = %event.key(), "Event published"),
            Ok(Err(e)) => warn!(topic = event.topic(), "Event publish failed: {}", e),
            Err(_) => warn!(topic = event.topic(), "Event publish timed out"),
        }
    }
}

fn ensure_active(customer: &Customer) -> BookingResult<()> {
    if customer.is_active() {
        Ok(())
    } else {
        Err(BookingError::InvalidArgument(format!("customer {} is disabled", customer.id)))
    }
}
