use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use skybook_core::flight::{HoldState, ReleaseOutcome, ReserveOutcome};
use skybook_core::repository::{ConflictKey, FlightRepository, StoreError, StoreResult};
use skybook_core::{Flight, FlightFilter, FlightStatus};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A flight's counter plus the holds taken against it.
struct FlightEntry {
    flight: Flight,
    holds: HashMap<Uuid, HoldState>,
}

impl FlightEntry {
    fn reserve(&mut self, hold_id: Uuid, count: u32) -> ReserveOutcome {
        if self.holds.contains_key(&hold_id) {
            return ReserveOutcome::Settled;
        }
        let outcome = self.flight.take_slots(count);
        if let ReserveOutcome::Reserved { .. } = outcome {
            self.holds.insert(hold_id, HoldState::Held(count));
        }
        outcome
    }

    fn release(&mut self, hold_id: Uuid) -> ReleaseOutcome {
        match self.holds.insert(hold_id, HoldState::Released) {
            Some(HoldState::Held(count)) => self.flight.return_slots(count),
            Some(HoldState::Released) => ReleaseOutcome::AlreadyReleased,
            None => ReleaseOutcome::NeverHeld,
        }
    }
}

/// In-memory flight store.
///
/// Each flight sits behind its own mutex, so reserve/release on one flight
/// serialize while other flights proceed untouched. The outer map lock is
/// only held long enough to clone the flight's handle. Hold keys live under
/// the same mutex as the counter they move.
#[derive(Default)]
pub struct InMemoryFlightRepository {
    flights: RwLock<HashMap<Uuid, Arc<Mutex<FlightEntry>>>>,
}

impl InMemoryFlightRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, id: Uuid) -> Option<Arc<Mutex<FlightEntry>>> {
        self.flights.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl FlightRepository for InMemoryFlightRepository {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        match self.slot(id).await {
            Some(entry) => Ok(Some(entry.lock().await.flight.clone())),
            None => Ok(None),
        }
    }

    async fn insert(&self, flight: &Flight) -> StoreResult<()> {
        let mut flights = self.flights.write().await;
        if flights.contains_key(&flight.id) {
            return Err(StoreError::Conflict(ConflictKey::Other("flight id".into())));
        }
        let entry = FlightEntry {
            flight: flight.clone(),
            holds: HashMap::new(),
        };
        flights.insert(flight.id, Arc::new(Mutex::new(entry)));
        Ok(())
    }

    async fn search(&self, filter: &FlightFilter) -> StoreResult<Vec<Flight>> {
        let handles: Vec<_> = self.flights.read().await.values().cloned().collect();

        let mut found = Vec::new();
        for handle in handles {
            let entry = handle.lock().await;
            if filter.matches(&entry.flight) {
                found.push(entry.flight.clone());
            }
        }
        found.sort_by_key(|f| f.departure);
        Ok(found)
    }

    async fn set_status(&self, id: Uuid, status: FlightStatus) -> StoreResult<Option<Flight>> {
        let Some(handle) = self.slot(id).await else {
            return Ok(None);
        };
        let mut entry = handle.lock().await;
        entry.flight.status = status;
        entry.flight.updated_at = chrono::Utc::now();
        Ok(Some(entry.flight.clone()))
    }

    async fn reserve_slots(&self, id: Uuid, hold_id: Uuid, count: u32) -> StoreResult<ReserveOutcome> {
        match self.slot(id).await {
            Some(handle) => Ok(handle.lock().await.reserve(hold_id, count)),
            None => Ok(ReserveOutcome::Missing),
        }
    }

    async fn release_slots(&self, id: Uuid, hold_id: Uuid, _count: u32) -> StoreResult<ReleaseOutcome> {
        match self.slot(id).await {
            Some(handle) => Ok(handle.lock().await.release(hold_id)),
            None => Ok(ReleaseOutcome::Missing),
        }
    }
}
