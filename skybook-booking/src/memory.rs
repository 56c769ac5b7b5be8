use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use skybook_core::repository::{
    BookingRepository, ConflictKey, CustomerRepository, ReleaseBacklog, StoreError, StoreResult, StuckRelease,
    Transition,
};
use skybook_core::{Booking, BookingFilter, BookingStatus, Customer, CustomerFilter, CustomerPatch, MatchKey};
use skybook_inventory::InMemoryFlightRepository;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::orchestrator::Stores;

#[derive(Default)]
struct CustomerTable {
    rows: HashMap<Uuid, Customer>,
    index: HashMap<MatchKey, Uuid>,
}

impl CustomerTable {
    /// Keys of `customer` already owned by someone else.
    fn taken_key(&self, customer: &Customer) -> Option<ConflictKey> {
        customer.match_keys().into_iter().find_map(|key| match self.index.get(&key) {
            Some(owner) if *owner != customer.id => Some(ConflictKey::for_match_key(&key)),
            _ => None,
        })
    }

    fn reindex(&mut self, customer: &Customer) {
        self.index.retain(|_, owner| *owner != customer.id);
        for key in customer.match_keys() {
            self.index.insert(key, customer.id);
        }
    }
}

/// In-memory customer store with unique identity keys.
#[derive(Default)]
pub struct InMemoryCustomerRepository {
    table: Mutex<CustomerTable>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn find_by_key(&self, key: &MatchKey) -> StoreResult<Option<Customer>> {
        let table = self.table.lock().await;
        Ok(table.index.get(key).and_then(|id| table.rows.get(id)).cloned())
    }

    async fn insert(&self, customer: &Customer) -> StoreResult<()> {
        let mut table = self.table.lock().await;
        if table.rows.contains_key(&customer.id) {
            return Err(StoreError::Conflict(ConflictKey::Other("customer id".into())));
        }
        if let Some(key) = table.taken_key(customer) {
            return Err(StoreError::Conflict(key));
        }
        table.reindex(customer);
        table.rows.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn apply_patch(&self, id: Uuid, patch: &CustomerPatch) -> StoreResult<Option<Customer>> {
        let mut table = self.table.lock().await;
        let Some(mut customer) = table.rows.get(&id).cloned() else {
            return Ok(None);
        };
        customer.apply(patch.clone());
        if let Some(key) = table.taken_key(&customer) {
            return Err(StoreError::Conflict(key));
        }
        table.reindex(&customer);
        table.rows.insert(id, customer.clone());
        Ok(Some(customer))
    }

    async fn search(&self, filter: &CustomerFilter) -> StoreResult<Vec<Customer>> {
        let table = self.table.lock().await;
        let mut found: Vec<Customer> = table.rows.values().filter(|c| filter.matches(c)).cloned().collect();
        found.sort_by_key(|c| c.created_at);
        Ok(found)
    }
}

#[derive(Default)]
struct BookingTable {
    rows: HashMap<Uuid, Booking>,
    codes: HashMap<String, Uuid>,
}

/// In-memory booking store; booking codes are unique.
#[derive(Default)]
pub struct InMemoryBookingRepository {
    table: Mutex<BookingTable>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn insert(&self, booking: &Booking) -> StoreResult<()> {
        let mut table = self.table.lock().await;
        if table.codes.contains_key(booking.code.as_str()) {
            return Err(StoreError::Conflict(ConflictKey::BookingCode));
        }
        if table.rows.contains_key(&booking.id) {
            return Err(StoreError::Conflict(ConflictKey::Other("booking id".into())));
        }
        table.codes.insert(booking.code.to_string(), booking.id);
        table.rows.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn transition(&self, id: Uuid, from: BookingStatus, to: BookingStatus) -> StoreResult<Transition> {
        let mut table = self.table.lock().await;
        let Some(booking) = table.rows.get_mut(&id) else {
            return Ok(Transition::Missing);
        };
        if booking.status != from {
            return Ok(Transition::Unchanged(booking.clone()));
        }
        booking.status = to;
        booking.updated_at = Utc::now();
        Ok(Transition::Applied(booking.clone()))
    }

    async fn search(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let table = self.table.lock().await;
        if let Some(code) = &filter.code {
            let hit = table.codes.get(code).and_then(|id| table.rows.get(id));
            return Ok(hit.filter(|b| filter.matches(b)).cloned().into_iter().collect());
        }
        let mut found: Vec<Booking> = table.rows.values().filter(|b| filter.matches(b)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

/// In-memory stuck-release queue.
#[derive(Default)]
pub struct InMemoryReleaseBacklog {
    entries: Mutex<Vec<StuckRelease>>,
}

impl InMemoryReleaseBacklog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReleaseBacklog for InMemoryReleaseBacklog {
    async fn push(&self, release: &StuckRelease) -> StoreResult<()> {
        self.entries.lock().await.push(release.clone());
        Ok(())
    }

    async fn pending(&self, limit: usize) -> StoreResult<Vec<StuckRelease>> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().take(limit).cloned().collect())
    }

    async fn resolve(&self, id: Uuid) -> StoreResult<()> {
        self.entries.lock().await.retain(|e| e.id != id);
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, reason: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.attempts += 1;
            entry.last_error = reason.to_string();
        }
        Ok(())
    }
}

impl Stores {
    /// Fresh, empty in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            customers: Arc::new(InMemoryCustomerRepository::new()),
            flights: Arc::new(InMemoryFlightRepository::new()),
            bookings: Arc::new(InMemoryBookingRepository::new()),
            backlog: Arc::new(InMemoryReleaseBacklog::new()),
        }
    }
}
