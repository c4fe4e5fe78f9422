//! Deadlines for collaborator I/O.
//!
//! Every call the gate makes across a process boundary runs under a deadline.
//! An elapsed deadline is reported as [`StorageError::Timeout`], which the
//! HTTP boundary treats as an internal failure rather than a crash.

use std::{future::Future, time::Duration};

use crate::error::{StorageError, StorageResult};

/// Default per-stage deadline.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `operation` under `timeout`.
///
/// When the deadline elapses the inner future is dropped. Collaborators must
/// therefore keep their writes atomic at the await points they expose (a
/// dropped cache fill either lands completely or not at all).
///
/// # Errors
///
/// Returns [`StorageError::Timeout`] naming `operation` when the deadline
/// elapses, or the inner error unchanged.
pub async fn with_deadline<F, T>(
    operation: &'static str,
    timeout: Duration,
    future: F,
) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "deadline exceeded");
            Err(StorageError::timeout(operation, timeout))
        },
    }
}
