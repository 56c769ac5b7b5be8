pub mod directory;
pub mod ledger;
pub mod memory;
pub mod orchestrator;
pub mod reconcile;

pub use directory::CustomerDirectory;
pub use ledger::{BookingLedger, StatusChange};
pub use memory::{InMemoryBookingRepository, InMemoryCustomerRepository, InMemoryReleaseBacklog};
pub use orchestrator::{
    BookingOrchestrator, BookingStage, CustomerBookingRequest, GuestBookingRequest, Stores,
};
pub use reconcile::{ReconcileReport, Reconciler};
