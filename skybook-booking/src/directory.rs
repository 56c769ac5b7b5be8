use std::sync::Arc;
use std::time::Duration;

use skybook_core::deadline::within;
use skybook_core::repository::CustomerRepository;
use skybook_core::{
    BookingError, BookingResult, Customer, CustomerFilter, CustomerPatch, CustomerProfile, CustomerStatus, MatchKey,
    MatchKeys,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Owns customer identity: lookup, dedup-on-create and partial updates.
#[derive(Clone)]
pub struct CustomerDirectory {
    customers: Arc<dyn CustomerRepository>,
    timeout: Duration,
    attempts: u32,
}

impl CustomerDirectory {
    pub fn new(customers: Arc<dyn CustomerRepository>, timeout: Duration, attempts: u32) -> Self {
        Self {
            customers,
            timeout,
            attempts: attempts.max(1),
        }
    }

    pub async fn get(&self, id: Uuid) -> BookingResult<Customer> {
        within(self.timeout, "get_customer", self.customers.get(id))
            .await?
            .ok_or_else(|| BookingError::not_found("customer", id))
    }

    pub async fn search(&self, filter: &CustomerFilter) -> BookingResult<Vec<Customer>> {
        within(self.timeout, "search_customers", self.customers.search(filter)).await
    }

    /// Return the customer owning any of `keys`, creating one from `profile`
    /// when nobody does.
    ///
    /// Two callers racing on the same identity both end up with the same
    /// customer: the loser's insert hits a unique key and re-queries.
    pub async fn find_or_create(&self, keys: &MatchKeys, profile: CustomerProfile) -> BookingResult<Customer> {
        let keys = keys.keys();
        if keys.is_empty() {
            return Err(BookingError::InvalidArgument(
                "at least one of email, phone or identity document is required".into(),
            ));
        }

        for attempt in 1..=self.attempts {
            if let Some(existing) = self.lookup(&keys).await? {
                debug!(customer_id = %existing.id, "Resolved existing customer");
                return Ok(existing);
            }

            let candidate = Customer::new(profile.clone());
            match within(self.timeout, "insert_customer", self.customers.insert(&candidate)).await {
                Ok(()) => {
                    info!(customer_id = %candidate.id, "Customer created");
                    return Ok(candidate);
                }
                Err(BookingError::Conflict(key)) => {
                    debug!(attempt, "Identity race on {}, re-querying", key);
                }
                Err(e) => return Err(e),
            }
        }

        self.lookup(&keys)
            .await?
            .ok_or_else(|| BookingError::Conflict("customer identity".into()))
    }

    /// First key with a match wins.
    async fn lookup(&self, keys: &[MatchKey]) -> BookingResult<Option<Customer>> {
        for key in keys {
            if let Some(found) = within(self.timeout, "find_customer", self.customers.find_by_key(key)).await? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Apply only the fields present in `patch`, as one store-side step.
    pub async fn update(&self, id: Uuid, patch: CustomerPatch) -> BookingResult<Customer> {
        let customer = within(self.timeout, "update_customer", self.customers.apply_patch(id, &patch))
            .await?
            .ok_or_else(|| BookingError::not_found("customer", id))?;
        info!(customer_id = %id, "Customer updated");
        Ok(customer)
    }

    pub async fn disable(&self, id: Uuid) -> BookingResult<Customer> {
        self.update(
            id,
            CustomerPatch {
                status: Some(CustomerStatus::Disabled),
                ..Default::default()
            },
        )
        .await
    }
}
