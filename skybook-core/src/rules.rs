use serde::Deserialize;
use std::time::Duration;

/// Tunables for the booking workflows, loaded from the `booking` config section.
#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,
    #[serde(default = "default_code_attempts")]
    pub code_attempts: u32,
    #[serde(default = "default_identity_attempts")]
    pub identity_attempts: u32,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_reconcile_batch")]
    pub reconcile_batch: usize,
}

fn default_storage_timeout_ms() -> u64 { 3000 }
fn default_code_attempts() -> u32 { 5 }
fn default_identity_attempts() -> u32 { 3 }
fn default_reconcile_interval_secs() -> u64 { 30 }
fn default_reconcile_batch() -> usize { 100 }

impl BookingRules {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            storage_timeout_ms: default_storage_timeout_ms(),
            code_attempts: default_code_attempts(),
            identity_attempts: default_identity_attempts(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            reconcile_batch: default_reconcile_batch(),
        }
    }
}
