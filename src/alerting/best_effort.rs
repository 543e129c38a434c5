use std::fmt::Display;
use std::future::Future;

use tracing::warn;

/// Runs a side effect whose failure must never reach the caller.
///
/// The error is logged and dropped; `None` tells the caller the effect did not land.
pub async fn best_effort<T, E, F>(effect: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(effect, error = %e, "Non-critical side effect failed.");
            None
        }
    }
}
