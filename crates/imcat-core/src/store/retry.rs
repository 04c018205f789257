//! Bounded retry for transient store faults
//!
//! Only [`StoreError::Transient`] is retried; every other error propagates
//! immediately. Fixed attempt count, fixed delay.

use std::time::Duration;

use tracing::warn;

use super::StoreError;

pub const MAX_ATTEMPTS: u32 = 5;
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Run `op`, retrying transient store errors up to [`MAX_ATTEMPTS`] times
/// with a fixed delay between attempts.
pub fn with_retry<T>(
    what: &str,
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(what, attempt, %err, "transient store error, retrying");
                std::thread::sleep(RETRY_DELAY);
                attempt += 1;
            }
            other => return other,
        }
    }
}
