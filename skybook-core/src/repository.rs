use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::booking::{Booking, BookingFilter, BookingStatus};
use crate::customer::{Customer, CustomerFilter, CustomerPatch, MatchKey};
use crate::flight::{Flight, FlightFilter, FlightStatus};

pub use crate::flight::{HoldState, ReleaseOutcome, ReserveOutcome};

/// Which unique key a write collided with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKey {
    BookingCode,
    Email,
    Phone,
    IdentityDocument,
    Other(String),
}

impl ConflictKey {
    pub fn for_match_key(key: &MatchKey) -> Self {
        match key {
            MatchKey::Email(_) => ConflictKey::Email,
            MatchKey::Phone(_) => ConflictKey::Phone,
            MatchKey::IdentityDocument(_) => ConflictKey::IdentityDocument,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, ConflictKey::Email | ConflictKey::Phone | ConflictKey::IdentityDocument)
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKey::BookingCode => f.write_str("booking code"),
            ConflictKey::Email => f.write_str("email"),
            ConflictKey::Phone => f.write_str("phone"),
            ConflictKey::IdentityDocument => f.write_str("identity document"),
            ConflictKey::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated on {0}")]
    Conflict(ConflictKey),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a conditional status update.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// This call moved the booking into the target status.
    Applied(Booking),
    /// The booking was not in the expected source status; nothing changed.
    Unchanged(Booking),
    Missing,
}

/// Seats that should have gone back to a flight but did not, or may not have.
///
/// Retrying is safe: the release is keyed by `hold_id`, so a release that
/// already landed is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StuckRelease {
    pub id: Uuid,
    /// Key the seats were reserved under. Equal to the booking id for
    /// bookings that were written.
    pub hold_id: Uuid,
    /// `None` when no booking is known to own the seats (rolled back, or the
    /// reserve itself timed out).
    pub booking_id: Option<Uuid>,
    pub flight_id: Uuid,
    pub slot: u32,
    pub attempts: u32,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
}

impl StuckRelease {
    pub fn new(
        hold_id: Uuid,
        booking_id: Option<Uuid>,
        flight_id: Uuid,
        slot: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            hold_id,
            booking_id,
            flight_id,
            slot,
            attempts: 1,
            last_error: reason.into(),
            created_at: Utc::now(),
        }
    }
}

/// Repository trait for customer identity data access
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Customer>>;

    /// Exact-match lookup on one identity key.
    async fn find_by_key(&self, key: &MatchKey) -> StoreResult<Option<Customer>>;

    /// Fails with `StoreError::Conflict` when any identity key is already taken.
    async fn insert(&self, customer: &Customer) -> StoreResult<()>;

    /// Apply `patch` in one atomic step, touching only the fields it sets.
    /// `None` when `id` is unknown.
    async fn apply_patch(&self, id: Uuid, patch: &CustomerPatch) -> StoreResult<Option<Customer>>;

    async fn search(&self, filter: &CustomerFilter) -> StoreResult<Vec<Customer>>;
}

/// Repository trait for flight inventory access.
///
/// `reserve_slots` and `release_slots` must each be a single atomic step
/// against concurrent callers on the same flight. Calls on different flights
/// must not contend.
///
/// Both are keyed by a hold id recorded in the same step as the counter
/// change: a hold is taken at most once and released at most once, whatever
/// the order or number of calls.
#[async_trait]
pub trait FlightRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Flight>>;

    async fn insert(&self, flight: &Flight) -> StoreResult<()>;

    async fn search(&self, filter: &FlightFilter) -> StoreResult<Vec<Flight>>;

    async fn set_status(&self, id: Uuid, status: FlightStatus) -> StoreResult<Option<Flight>>;

    async fn reserve_slots(&self, id: Uuid, hold_id: Uuid, count: u32) -> StoreResult<ReserveOutcome>;

    /// Give back what `hold_id` took. Releasing an unknown hold records it as
    /// released without touching the counter.
    async fn release_slots(&self, id: Uuid, hold_id: Uuid, count: u32) -> StoreResult<ReleaseOutcome>;
}

/// Repository trait for booking records
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// Fails with `StoreError::Conflict(ConflictKey::BookingCode)` on a duplicate code.
    async fn insert(&self, booking: &Booking) -> StoreResult<()>;

    /// Move `id` from `from` to `to` only if it is currently in `from`.
    async fn transition(&self, id: Uuid, from: BookingStatus, to: BookingStatus) -> StoreResult<Transition>;

    async fn search(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>>;
}

/// Durable queue of seat releases awaiting retry.
#[async_trait]
pub trait ReleaseBacklog: Send + Sync {
    async fn push(&self, release: &StuckRelease) -> StoreResult<()>;

    /// Oldest first.
    async fn pending(&self, limit: usize) -> StoreResult<Vec<StuckRelease>>;

    async fn resolve(&self, id: Uuid) -> StoreResult<()>;

    async fn record_failure(&self, id: Uuid, reason: &str) -> StoreResult<()>;
}
