//! Fixed-delay retry for renderer startup.
//!
//! The renderer creates its IPC socket some time after the process starts,
//! so the launcher polls for it instead of sleeping a fixed amount.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use super::traits::{BackendError, BackendResult};

/// Runs `operation` until it succeeds, up to `attempts` times with `delay`
/// between tries.
///
/// Before each retry `abort` is consulted; returning `Some(reason)` stops
/// immediately (e.g. the process already exited). Exhaustion and aborts both
/// surface as [`BackendError::Launch`].
pub(crate) async fn with_fixed_retry<T, E, F, Fut, A>(
    action: &str,
    attempts: u32,
    delay: Duration,
    mut abort: A,
    mut operation: F,
) -> BackendResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    A: FnMut() -> Option<String>,
{
    let mut last_error = None;
    for attempt in 1..=attempts.max(1) {
        if attempt > 1 {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = abort() {
            return Err(BackendError::Launch(format!("{action} aborted: {reason}")));
        }

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    log::debug!("[Mpv] {} succeeded on attempt {}", action, attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                log::trace!("[Mpv] {} attempt {} failed: {}", action, attempt, e);
                last_error = Some(e.to_string());
            }
        }
    }

    Err(BackendError::Launch(format!(
        "{action} failed after {attempts} attempt(s): {}",
        last_error.unwrap_or_default()
    )))
}
