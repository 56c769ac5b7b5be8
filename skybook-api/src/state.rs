use std::sync::Arc;

use skybook_booking::BookingOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: BookingOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
