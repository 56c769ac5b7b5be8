use std::sync::Arc;
use std::time::Duration;

use skybook_core::deadline::within;
use skybook_core::flight::{ReleaseOutcome, ReserveOutcome};
use skybook_core::repository::FlightRepository;
use skybook_core::{Availability, BookingError, BookingResult, Flight, FlightFilter, FlightStatus, NewFlight};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hold::SeatHold;

/// Seat counter per flight. Every mutation goes through one atomic
/// repository call; this type never reads-then-writes.
#[derive(Clone)]
pub struct FlightInventory {
    flights: Arc<dyn FlightRepository>,
    timeout: Duration,
}

impl FlightInventory {
    pub fn new(flights: Arc<dyn FlightRepository>, timeout: Duration) -> Self {
        Self { flights, timeout }
    }

    /// Create a scheduled flight with every seat available.
    pub async fn register_flight(&self, new_flight: NewFlight) -> BookingResult<Flight> {
        if new_flight.capacity == 0 {
            return Err(BookingError::InvalidArgument("flight capacity must be positive".into()));
        }
        if [&new_flight.name, &new_flight.origin, &new_flight.destination]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(BookingError::InvalidArgument("flight name and route are required".into()));
        }

        let flight = Flight::new(new_flight);
        within(self.timeout, "insert_flight", self.flights.insert(&flight)).await?;
        info!(flight_id = %flight.id, capacity = flight.capacity, "Flight registered: {}", flight.name);
        Ok(flight)
    }

    pub async fn get_flight(&self, flight_id: Uuid) -> BookingResult<Flight> {
        within(self.timeout, "get_flight", self.flights.get(flight_id))
            .await?
            .ok_or_else(|| BookingError::not_found("flight", flight_id))
    }

    pub async fn get_availability(&self, flight_id: Uuid) -> BookingResult<Availability> {
        Ok(self.get_flight(flight_id).await?.availability())
    }

    pub async fn search_flights(&self, filter: &FlightFilter) -> BookingResult<Vec<Flight>> {
        within(self.timeout, "search_flights", self.flights.search(filter)).await
    }

    pub async fn set_status(&self, flight_id: Uuid, status: FlightStatus) -> BookingResult<Flight> {
        let flight = within(self.timeout, "set_flight_status", self.flights.set_status(flight_id, status))
            .await?
            .ok_or_else(|| BookingError::not_found("flight", flight_id))?;
        info!(flight_id = %flight_id, status = status.as_str(), "Flight status changed");
        Ok(flight)
    }

    /// Take `count` seats under `hold_id`. The returned hold gives them back
    /// unless confirmed.
    ///
    /// A `StorageUnavailable` error leaves it open whether the seats were
    /// taken; releasing the same `hold_id` later settles it either way.
    pub async fn reserve(&self, flight_id: Uuid, hold_id: Uuid, count: u32) -> BookingResult<SeatHold> {
        if count == 0 {
            return Err(BookingError::InvalidArgument("slot must be positive".into()));
        }

        let outcome = within(
            self.timeout,
            "reserve_slots",
            self.flights.reserve_slots(flight_id, hold_id, count),
        )
        .await?;

        match outcome {
            ReserveOutcome::Reserved { remaining } => {
                debug!(flight_id = %flight_id, hold_id = %hold_id, count, remaining, "Seats reserved");
                Ok(SeatHold::new(self.clone(), flight_id, hold_id, count, remaining))
            }
            ReserveOutcome::Insufficient { available } => Err(BookingError::InsufficientInventory {
                flight_id,
                requested: count,
                available,
            }),
            ReserveOutcome::NotBookable(status) => {
                debug!(flight_id = %flight_id, status = status.as_str(), "Reserve on unbookable flight");
                Err(BookingError::not_found("scheduled flight", flight_id))
            }
            ReserveOutcome::Settled => Err(BookingError::Conflict(format!("seat hold {}", hold_id))),
            ReserveOutcome::Missing => Err(BookingError::not_found("flight", flight_id)),
        }
    }

    /// Give back the `count` seats taken under `hold_id`, capped at capacity.
    /// Releasing the same hold twice is a no-op; a capped release is reported
    /// but not treated as a failure.
    pub async fn release(&self, flight_id: Uuid, hold_id: Uuid, count: u32) -> BookingResult<ReleaseOutcome> {
        if count == 0 {
            return Err(BookingError::InvalidArgument("slot must be positive".into()));
        }

        let outcome = within(
            self.timeout,
            "release_slots",
            self.flights.release_slots(flight_id, hold_id, count),
        )
        .await?;

        match outcome {
            ReleaseOutcome::Released { available } => {
                debug!(flight_id = %flight_id, hold_id = %hold_id, count, available, "Seats released");
            }
            ReleaseOutcome::AlreadyReleased => {
                debug!(flight_id = %flight_id, hold_id = %hold_id, "Hold already released");
            }
            ReleaseOutcome::NeverHeld => {
                info!(flight_id = %flight_id, hold_id = %hold_id, "Hold was never taken, key closed");
            }
            ReleaseOutcome::Clamped { available, overflow } => {
                warn!(
                    flight_id = %flight_id,
                    count,
                    overflow,
                    available,
                    "Release exceeded capacity, clamped"
                );
            }
            ReleaseOutcome::Missing => return Err(BookingError::not_found("flight", flight_id)),
        }

        Ok(outcome)
    }
}
