use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cloud::CloudResult;
use crate::config::FixConfiguration;

/// Runs a read/describe call, retrying transient provider errors with
/// exponential backoff starting at `retry_delay`. Always makes at least one
/// attempt.
pub async fn with_retry<T, F, Fut>(config: &FixConfiguration, operation: &str, mut call: F) -> CloudResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CloudResult<T>>,
{
    let max_attempts = config.max_retry_attempts.max(1);
    let mut delay = config.retry_delay();
    let mut attempt = 1;

    loop {
        debug!(operation, attempt, "Calling remote operation");
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                delay = delay.saturating_mul(2).min(Duration::from_secs(60));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
