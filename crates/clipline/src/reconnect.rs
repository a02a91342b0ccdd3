//! Fixed-delay, unbounded retry for connecting to infrastructure.
//!
//! Losing the queue or the status store is never fatal to the worker: the
//! operation is retried every `delay` until it succeeds or the token is
//! cancelled.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Runs `operation` until it returns `Ok`, sleeping `delay` between
/// attempts. Returns `None` if `token` is cancelled first.
pub async fn retry_forever<F, Fut, T, E>(
    what: &str,
    delay: Duration,
    token: &CancellationToken,
    mut operation: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u64 = 0;
    loop {
        if token.is_cancelled() {
            return None;
        }

        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(component = what, attempt, "Connected after retrying");
                }
                return Some(value);
            }
            Err(err) => {
                warn!(
                    component = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Connection attempt failed, retrying"
                );
                tokio::select! {
                    _ = token.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
