//! Circuit breaker for upstream calls.
//!
//! The breaker prevents hammering an upstream that is already failing. State
//! transitions:
//!
//! - **Closed → Open**: consecutive failures reach the threshold
//! - **Open → HalfOpen**: the reset timeout elapses (failure count resets)
//! - **HalfOpen → Closed**: the trial call succeeds
//! - **HalfOpen → Open**: the trial call fails
//!
//! While Open, calls fail fast without dialing. While HalfOpen, exactly one
//! trial call is admitted; concurrent callers fail fast until it resolves.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observable breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation, requests flow through
    Closed,
    /// Circuit is tripped, requests fail fast without reaching the upstream
    Open,
    /// Testing whether the upstream has recovered
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before tripping the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a trial call
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Three-state circuit breaker.
///
/// Transitions are serialized under an internal lock; no reader observes
/// Open before the transition is recorded. The lock is never held across an
/// await point.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a breaker in the Closed state.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Asks whether a call may proceed.
    ///
    /// Handles the Open → HalfOpen transition when the reset timeout has
    /// elapsed. In HalfOpen, admits exactly one trial; the rest fail fast
    /// until [`CircuitBreaker::record_success`] or
    /// [`CircuitBreaker::record_failure`] resolves the trial.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.consecutive_failures = 0;
                    inner.opened_at = None;
                    inner.trial_in_flight = true;
                    tracing::debug!("circuit half-open, admitting trial call");
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful call. Resets the failure count and closes the
    /// circuit from any state.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
        if inner.state != BreakerState::Closed {
            tracing::info!("circuit closed after successful call");
        }
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
    }

    /// Records a failed call, tripping the circuit when the threshold is
    /// reached or the half-open trial fails.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                tracing::warn!("trial call failed, circuit re-opened");
            }
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "failure threshold reached, circuit opened"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Returns the current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_failures
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: reset,
        })
    }

    #[test]
    fn test_starts_closed() {
        let b = CircuitBreaker::default();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire());
    }

    #[test]
    fn test_opens_after_threshold() {
        let b = breaker(3, Duration::from_secs(30));
        for _ in 0..2 {
            b.record_failure();
            assert_eq!(b.state(), BreakerState::Closed);
        }
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.try_acquire());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let b = breaker(3, Duration::from_secs(30));
        b.record_failure();
        b.record_failure();
        b.record_success();
        assert_eq!(b.consecutive_failures(), 0);

        // Threshold starts over after the success.
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_reset_timeout() {
        let b = breaker(1, Duration::from_millis(10));
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.try_acquire());

        std::thread::sleep(Duration::from_millis(15));
        assert!(b.try_acquire());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let b = breaker(1, Duration::from_millis(10));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(15));

        assert!(b.try_acquire());
        // Trial outstanding: everyone else fails fast.
        assert!(!b.try_acquire());
        assert!(!b.try_acquire());

        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire());
    }

    #[test]
    fn test_failed_trial_reopens() {
        let b = breaker(1, Duration::from_millis(10));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(b.try_acquire());

        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.try_acquire());
    }

    #[test]
    fn test_concurrent_half_open_trial_is_exclusive() {
        use std::sync::Arc;

        let b = Arc::new(breaker(1, Duration::from_millis(5)));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(10));

        let admitted: Vec<bool> = (0..8)
            .map(|_| {
                let b = Arc::clone(&b);
                std::thread::spawn(move || b.try_acquire())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        assert_eq!(admitted.iter().filter(|a| **a).count(), 1);
    }
}
