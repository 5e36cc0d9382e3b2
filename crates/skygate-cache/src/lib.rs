//! Skygate Cache
//!
//! In-memory cache with TTL expiration, approximate LRU eviction,
//! single-flight loaders, stale-on-failure fallback, and optional JSON
//! snapshot persistence.
//!
//! # Semantics
//!
//! - `get` returns a value only while its TTL is live and bumps the entry's
//!   last-access instant
//! - `set` keeps a parallel *stale* copy with a longer horizon, served when a
//!   loader fails and `allow_stale_on_fail` is enabled
//! - `get_or_load` coalesces concurrent misses for the same key onto a single
//!   in-flight load
//! - a background sweep drops expired entries; an optional background task
//!   snapshots the live map to disk (write-to-temp, then rename)

mod cache;
mod persist;

pub use cache::{Cache, CacheOptions, CacheStats, Entry, Loaded, PersistOptions};
