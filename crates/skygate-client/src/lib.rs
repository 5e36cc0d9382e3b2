//! Skygate Outbound Client
//!
//! Reliability layer for calls against the upstream AT Protocol XRPC API.
//! Every request runs under an exponential-backoff retry policy guarded by a
//! per-client circuit breaker, with an endpoint-keyed static fallback
//! consulted when the upstream is unreachable.
//!
//! # Components
//!
//! - [`RetryPolicy`] - exponential backoff with jitter and an elapsed budget
//! - [`CircuitBreaker`] - three-state breaker with a single half-open trial
//! - [`XrpcClient`] - the HTTP client combining both with a fallback registry

pub mod breaker;
pub mod client;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use client::XrpcClient;
pub use retry::RetryPolicy;
