use std::future::Future;
use std::time::Duration;

use crate::{BookingError, BookingResult, StoreResult};

/// Run a storage call under a deadline. An elapsed deadline is reported as
/// `StorageUnavailable` so the caller can retry.
pub async fn within<T, F>(limit: Duration, op: &'static str, fut: F) -> BookingResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(BookingError::from),
        Err(_) => {
            tracing::warn!(op, timeout_ms = limit.as_millis() as u64, "storage call timed out");
            Err(BookingError::StorageUnavailable(format!(
                "{} timed out after {}ms",
                op,
                limit.as_millis()
            )))
        }
    }
}
