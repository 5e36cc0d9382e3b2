//! Retry policy with exponential backoff.

use std::future::Future;
use std::time::{Duration, Instant};

use skygate_common::{GatewayError, Result};

/// Exponential backoff retry policy.
///
/// Delays grow by `multiplier` from `initial_delay` up to `max_delay`, with
/// 10% random jitter on top. Retrying stops once the cumulative elapsed time
/// would exceed `max_elapsed`. Only errors reporting
/// [`GatewayError::is_retryable`] are retried; everything else
/// short-circuits.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Exponential growth factor
    pub multiplier: f64,
    /// Total time budget across all attempts
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    /// Defaults tuned for interactive upstream calls: 500ms initial, 5s cap,
    /// 1.5x growth, 30s budget.
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 1.5,
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings.
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        max_elapsed: Duration,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            max_elapsed,
        }
    }

    /// Policy used for session establishment: slower, more patient.
    pub fn auth_default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_elapsed: Duration::from_secs(120),
        }
    }

    /// Calculates the delay before retry number `attempt` (1-based), with
    /// jitter to avoid thundering herd.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = (base_ms * self.multiplier.powi(attempt as i32 - 1))
            .min(self.max_delay.as_millis() as f64) as u64;

        let jitter = (delay_ms as f64 * 0.1) as u64;
        let jitter_amount = if jitter > 0 && rand::random::<bool>() {
            rand::random::<u64>() % jitter
        } else {
            0
        };

        Duration::from_millis(delay_ms + jitter_amount)
    }

    /// Runs `op` until it succeeds, fails permanently, or the elapsed budget
    /// is spent.
    ///
    /// Retries are invisible to the caller beyond latency: the returned value
    /// is either the first success or the last error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let mut attempt: u32 = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    if start.elapsed() + delay > self.max_elapsed {
                        return Err(err);
                    }
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
