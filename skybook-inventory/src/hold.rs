use std::fmt;

use skybook_core::flight::ReleaseOutcome;
use skybook_core::{BookingError, BookingResult};
use tracing::{error, warn};
use uuid::Uuid;

use crate::inventory::FlightInventory;

/// Seats taken from a flight and not yet owned by a booking.
///
/// Consume it with [`SeatHold::confirm`] once the booking is persisted, or
/// [`SeatHold::release`] to compensate. A hold dropped while still armed
/// (the owning future was cancelled) releases its seats on a detached task.
/// Every release is keyed by [`SeatHold::id`], so at most one of them moves
/// the counter.
#[must_use = "an unconfirmed SeatHold gives its seats back when dropped"]
pub struct SeatHold {
    inventory: FlightInventory,
    flight_id: Uuid,
    id: Uuid,
    count: u32,
    remaining: u32,
    armed: bool,
}

impl SeatHold {
    pub(crate) fn new(inventory: FlightInventory, flight_id: Uuid, id: Uuid, count: u32, remaining: u32) -> Self {
        Self {
            inventory,
            flight_id,
            id,
            count,
            remaining,
            armed: true,
        }
    }

    pub fn flight_id(&self) -> Uuid {
        self.flight_id
    }

    /// Key the seats were reserved under.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Seats left on the flight right after this hold was taken.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// The seats now belong to a persisted booking.
    pub fn confirm(mut self) {
        self.armed = false;
    }

    /// Disarm without releasing. The caller has recorded the hold somewhere
    /// that will settle it later.
    pub fn defer(mut self) {
        self.armed = false;
    }

    /// Hand the seats back. The release runs on its own task, so it completes
    /// even if the caller is cancelled while waiting for it.
    pub async fn release(mut self) -> BookingResult<ReleaseOutcome> {
        self.armed = false;
        let inventory = self.inventory.clone();
        let (flight_id, id, count) = (self.flight_id, self.id, self.count);

        tokio::spawn(async move { inventory.release(flight_id, id, count).await })
            .await
            .map_err(|e| BookingError::StorageUnavailable(format!("release task aborted: {}", e)))?
    }
}

impl Drop for SeatHold {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!(flight_id = %self.flight_id, slot = self.count, "Seat hold dropped unconfirmed, releasing");

        let inventory = self.inventory.clone();
        let (flight_id, id, count) = (self.flight_id, self.id, self.count);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = inventory.release(flight_id, id, count).await {
                        error!(flight_id = %flight_id, slot = count, "Release of abandoned hold failed: {}", e);
                    }
                });
            }
            Err(_) => {
                error!(flight_id = %flight_id, slot = count, "No runtime to release abandoned hold; seats are stuck");
            }
        }
    }
}

impl fmt::Debug for SeatHold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeatHold")
            .field("flight_id", &self.flight_id)
            .field("id", &self.id)
            .field("count", &self.count)
            .field("remaining", &self.remaining)
            .field("armed", &self.armed)
            .finish()
    }
}
