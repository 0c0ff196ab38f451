use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Computes exponential backoff with optional jitter.
#[derive(Debug, Clone)]
pub struct BackoffCalculator;

impl BackoffCalculator {
    /// Delay before the attempt after `attempt` (0-based): `initial * multiplier^attempt`, capped at max.
    pub fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
        let pow = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = ((config.initial_backoff_ms as f32 * pow) as u64)
            .clamp(config.initial_backoff_ms, config.max_backoff_ms.max(config.initial_backoff_ms));

        let jitter = config.jitter_factor.clamp(0.0, 1.0);
        if jitter > 0.0 {
            let mut rng = rand::rng();
            let jitter_scale: f32 = rng.random_range(-jitter..=jitter);
            let jitter_ms = (delay_ms as f32 * jitter_scale).round();
            let adjusted = (delay_ms as i64 + jitter_ms as i64).max(0) as u64;
            return Duration::from_millis(adjusted);
        }

        Duration::from_millis(delay_ms)
    }
}

/// Retries an async operation on every error, sleeping between attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor;

impl RetryExecutor {
    /// Run `operation(attempt)` up to `max_attempts` times.
    ///
    /// Returns the first success, or the error of the final attempt once
    /// attempts are exhausted.
    pub async fn execute<Op, Fut, T, E>(
        config: &RetryConfig,
        op_name: &'static str,
        mut operation: Op,
    ) -> Result<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max = config.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let next_attempt = attempt + 1;
                    if next_attempt >= max {
                        warn!(
                            "{} failed after {} attempt(s), giving up: {}",
                            op_name, next_attempt, e
                        );
                        return Err(e);
                    }

                    let delay = BackoffCalculator::calculate_delay(config, attempt);
                    debug!(
                        attempt = attempt,
                        next_attempt = next_attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed ({}), retrying",
                        op_name,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
            }
        }
    }
}
