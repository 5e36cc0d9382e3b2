//! Shared application state.
//!
//! Every long-lived resource is constructed once at startup and handed to
//! handlers through axum state. Nothing here is a lazy global; shutdown walks
//! the same values and stops them explicitly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use skygate_auth::TokenManager;
use skygate_cache::{Cache, CacheOptions, PersistOptions};
use skygate_common::rate_limit::{RateLimitConfig, RateLimiter};
use skygate_common::{AppConfig, BackupCredentials, Result};

/// Shared state behind the gateway's routes.
///
/// Cloning is cheap; all clones reference the same underlying resources.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub tokens: TokenManager,
    pub feed_cache: Arc<Cache>,
    pub community_cache: Arc<Cache>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Builds the production state: token manager for the configured host,
    /// the persisted feed cache, the small community cache, and the default
    /// per-IP limiter.
    pub fn new(config: AppConfig, backups: Vec<BackupCredentials>) -> Result<Self> {
        let tokens = TokenManager::new(config.clone(), backups)?;

        let feed_cache = Cache::with_options(CacheOptions {
            max_items: 2000,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(300),
            allow_stale_on_fail: true,
            stale_timeout: Duration::from_secs(3600),
            persist: Some(PersistOptions {
                directory: PathBuf::from("./cache/feed"),
                filename: "feed_cache.json".into(),
                save_interval: Duration::from_secs(600),
                load_on_startup: true,
            }),
        });
        let community_cache = Cache::new();
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));

        Ok(Self {
            config,
            tokens,
            feed_cache,
            community_cache,
            limiter,
        })
    }

    /// Assembles a state from externally constructed parts. Used by tests
    /// and by embedders that need custom cache or limiter settings.
    pub fn with_parts(
        config: AppConfig,
        tokens: TokenManager,
        feed_cache: Arc<Cache>,
        community_cache: Arc<Cache>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            config,
            tokens,
            feed_cache,
            community_cache,
            limiter,
        }
    }

    /// Stops background work: token refresh, cache sweeps, and persistence
    /// (caches take a final snapshot).
    pub async fn shutdown(&self) {
        self.tokens.stop();
        self.feed_cache.stop().await;
        self.community_cache.stop().await;
    }
}
