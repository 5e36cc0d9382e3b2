//! Rate Limiting
//!
//! Per-client sliding-window admission control for the gateway's inbound
//! surface. Each key (normally the remote IP) owns a list of admission
//! instants; a request is admitted when fewer than `max_requests` admissions
//! fall inside the rolling `window`.
//!
//! # Security Model
//!
//! - The window bounds sustained request rates without a separate burst knob
//! - Per-IP tracking prevents a single client from starving the gateway
//! - A periodic sweep drops idle keys to prevent memory exhaustion
//! - Rejection maps to HTTP 429 with the `rate_limited` code
//!
//! # Example
//!
//! ```no_run
//! use skygate_common::rate_limit::{RateLimiter, RateLimitConfig};
//! use std::net::IpAddr;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let limiter = RateLimiter::new(RateLimitConfig::default());
//! let ip: IpAddr = "127.0.0.1".parse().unwrap();
//! if limiter.check(ip).await.is_allowed() {
//!     // process the request
//! } else {
//!     // respond with HTTP 429
//! }
//! # });
//! ```

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Configuration for the sliding-window limiter.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Maximum admissions per key per window
    pub max_requests: usize,
    /// Length of the rolling window
    pub window: Duration,
    /// How often to sweep idle keys out of the map
    pub cleanup_period: Duration,
}

impl RateLimitConfig {
    /// Creates a configuration admitting `max_requests` per `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            cleanup_period: Duration::from_secs(300),
        }
    }
}

impl Default for RateLimitConfig {
    /// 60 requests per rolling minute per key.
    fn default() -> Self {
        Self::new(60, Duration::from_secs(60))
    }
}

/// Result of an admission check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is admitted
    Allowed,
    /// Request is rejected
    Limited {
        /// Time until the oldest admission leaves the window
        retry_after: Duration,
    },
}

impl RateLimitResult {
    /// Returns whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the retry-after hint when rejected.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Allowed => None,
            Self::Limited { retry_after } => Some(*retry_after),
        }
    }
}

struct LimiterInner {
    requests: HashMap<IpAddr, Vec<Instant>>,
    last_cleanup: Instant,
}

/// Sliding-window rate limiter.
///
/// A single lock guards the map and its lists; the per-call cost is bounded
/// by `max_requests` entries per key. The lock is never held across I/O.
pub struct RateLimiter {
    config: RateLimitConfig,
    inner: Mutex<LimiterInner>,
}

impl RateLimiter {
    /// Creates a new limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(LimiterInner {
                requests: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    /// Checks whether a request from `key` should be admitted.
    ///
    /// Drops admission instants older than the window, rejects when the
    /// remaining count has reached the limit, and otherwise records the
    /// current instant and admits.
    pub async fn check(&self, key: IpAddr) -> RateLimitResult {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        if now.duration_since(inner.last_cleanup) > self.config.cleanup_period {
            let window = self.config.window;
            inner.requests.retain(|_, times| {
                times.retain(|t| now.duration_since(*t) < window);
                !times.is_empty()
            });
            inner.last_cleanup = now;
        }

        let times = inner.requests.entry(key).or_default();
        times.retain(|t| now.duration_since(*t) < self.config.window);

        if times.len() >= self.config.max_requests {
            let oldest = times.first().copied().unwrap_or(now);
            let retry_after = self
                .config
                .window
                .saturating_sub(now.duration_since(oldest));
            return RateLimitResult::Limited { retry_after };
        }

        times.push(now);
        RateLimitResult::Allowed
    }

    /// Returns the number of keys currently tracked.
    ///
    /// Primarily useful for tests and monitoring.
    pub async fn tracked_key_count(&self) -> usize {
        self.inner.lock().await.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn test_ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, last))
    }

    #[tokio::test]
    async fn test_admits_up_to_limit() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, Duration::from_secs(60)));
        let ip = test_ip(1);

        for _ in 0..3 {
            assert!(limiter.check(ip).await.is_allowed());
        }
        assert!(!limiter.check(ip).await.is_allowed());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_millis(50)));
        let ip = test_ip(2);

        assert!(limiter.check(ip).await.is_allowed());
        assert!(limiter.check(ip).await.is_allowed());
        assert!(!limiter.check(ip).await.is_allowed());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check(ip).await.is_allowed());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(60)));

        for _ in 0..2 {
            assert!(limiter.check(test_ip(3)).await.is_allowed());
            assert!(limiter.check(test_ip(4)).await.is_allowed());
        }
        assert!(!limiter.check(test_ip(3)).await.is_allowed());
        assert!(!limiter.check(test_ip(4)).await.is_allowed());
    }

    #[tokio::test]
    async fn test_retry_after_hint() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
        let ip = test_ip(5);

        assert!(limiter.check(ip).await.is_allowed());
        let result = limiter.check(ip).await;
        let retry_after = result.retry_after().expect("should be limited");
        assert!(retry_after <= Duration::from_secs(60));
        assert!(retry_after > Duration::from_secs(55));
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_keys() {
        let config = RateLimitConfig {
            max_requests: 5,
            window: Duration::from_millis(10),
            cleanup_period: Duration::from_millis(20),
        };
        let limiter = RateLimiter::new(config);

        limiter.check(test_ip(6)).await;
        assert_eq!(limiter.tracked_key_count().await, 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        // Next check from another key triggers the sweep.
        limiter.check(test_ip(7)).await;
        assert_eq!(limiter.tracked_key_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_checks_respect_limit() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(
            10,
            Duration::from_secs(60),
        )));
        let ip = test_ip(8);

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check(ip).await.is_allowed() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
