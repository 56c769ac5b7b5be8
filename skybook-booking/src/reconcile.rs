use std::sync::Arc;
use std::time::Duration;

use skybook_core::deadline::within;
use skybook_core::flight::ReleaseOutcome;
use skybook_core::repository::{ReleaseBacklog, StuckRelease};
use skybook_core::{BookingError, BookingResult};
use skybook_inventory::FlightInventory;
use tracing::{error, info, warn};

use crate::ledger::BookingLedger;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub resolved: usize,
    pub failed: usize,
}

#[derive(Debug)]
enum Settlement {
    /// An active booking owns the seats; nothing to give back.
    Owned,
    Released(ReleaseOutcome),
}

/// Retries seat releases that a cancellation or rollback could not finish,
/// and settles holds whose reserve timed out.
///
/// Every retry releases under the entry's hold key. A release that already
/// landed, or a reserve that never did, leaves the counter untouched.
pub struct Reconciler {
    inventory: FlightInventory,
    ledger: BookingLedger,
    backlog: Arc<dyn ReleaseBacklog>,
    timeout: Duration,
    batch: usize,
}

impl Reconciler {
    pub fn new(
        inventory: FlightInventory,
        ledger: BookingLedger,
        backlog: Arc<dyn ReleaseBacklog>,
        timeout: Duration,
        batch: usize,
    ) -> Self {
        Self {
            inventory,
            ledger,
            backlog,
            timeout,
            batch: batch.max(1),
        }
    }

    /// One pass over the oldest pending releases.
    pub async fn run_once(&self) -> BookingResult<ReconcileReport> {
        let pending = within(self.timeout, "pending_releases", self.backlog.pending(self.batch)).await?;
        let mut report = ReconcileReport::default();

        for stuck in pending {
            match self.settle(&stuck).await {
                Ok(settlement) => {
                    within(self.timeout, "resolve_release", self.backlog.resolve(stuck.id)).await?;
                    info!(
                        hold_id = %stuck.hold_id,
                        flight_id = %stuck.flight_id,
                        slot = stuck.slot,
                        attempts = stuck.attempts,
                        settlement = ?settlement,
                        "Stuck release reconciled"
                    );
                    report.resolved += 1;
                }
                Err(BookingError::NotFound { .. }) => {
                    error!(flight_id = %stuck.flight_id, slot = stuck.slot, "Flight vanished, dropping stuck release");
                    within(self.timeout, "resolve_release", self.backlog.resolve(stuck.id)).await?;
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(flight_id = %stuck.flight_id, slot = stuck.slot, "Release retry failed: {}", e);
                    within(
                        self.timeout,
                        "record_release_failure",
                        self.backlog.record_failure(stuck.id, &e.to_string()),
                    )
                    .await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn settle(&self, stuck: &StuckRelease) -> BookingResult<Settlement> {
        // Without a known owner the booking write may still have landed.
        if stuck.booking_id.is_none() {
            match self.ledger.find_by_id(stuck.hold_id).await {
                Ok(booking) if booking.is_active() => return Ok(Settlement::Owned),
                Ok(_) | Err(BookingError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let outcome = self
            .inventory
            .release(stuck.flight_id, stuck.hold_id, stuck.slot)
            .await?;
        Ok(Settlement::Released(outcome))
    }

    /// Loop forever, one pass per `interval`.
    pub async fn run(self, interval: Duration) {
        info!(interval_secs = interval.as_secs(), "Reconciliation worker started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report) if report.resolved + report.failed > 0 => {
                    info!(resolved = report.resolved, failed = report.failed, "Reconciliation pass done");
                }
                Ok(_) => {}
                Err(e) => error!("Reconciliation pass aborted: {}", e),
            }
        }
    }
}
