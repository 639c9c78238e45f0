//! Fail-open utilities for graceful degradation
//!
//! Use these for operations that must never stop a calibration run, such as
//! the human-readable activity log.
//!
//! DO NOT use fail-open for:
//! - Pattern store reads and writes (corruption must surface)
//! - Oracle batches (unreliable batches must surface)
//! - Iteration history (it is the audit trail)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
