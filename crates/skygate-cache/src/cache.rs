//! Core cache implementation.
//!
//! # Concurrency
//!
//! The live and stale maps share one `tokio::sync::RwLock`; reads take the
//! shared lock, writes the exclusive lock. Statistics counters live behind a
//! separate `std::sync::Mutex` to keep the hot path read-light. Single-flight
//! coordination uses a per-key gate: the first miss takes the gate and runs
//! the loader, queued callers re-check the map once the gate is released.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use skygate_common::{GatewayError, Result};

use crate::persist;

/// A cached item with absolute expiration, in nanoseconds since the epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub value: Value,
    pub expiration: i64,
    #[serde(default)]
    pub last_access: i64,
}

/// Monotone cache counters plus the derived size.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub evictions: u64,
    pub stale_served: u64,
    pub persist_writes: u64,
    pub persist_errors: u64,
}

/// Disk snapshot configuration.
#[derive(Debug, Clone)]
pub struct PersistOptions {
    /// Directory holding the snapshot file
    pub directory: PathBuf,
    /// Snapshot file name inside `directory`
    pub filename: String,
    /// Interval between background snapshots
    pub save_interval: Duration,
    /// Whether to seed the cache from the snapshot at construction
    pub load_on_startup: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./cache"),
            filename: "cache_data.json".into(),
            save_interval: Duration::from_secs(600),
            load_on_startup: true,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum number of live entries; 0 disables eviction
    pub max_items: usize,
    /// TTL applied when `set` is called with a zero duration
    pub default_ttl: Duration,
    /// Interval of the expired-entry sweep
    pub cleanup_interval: Duration,
    /// Whether load failures may be answered from the stale map
    pub allow_stale_on_fail: bool,
    /// Lifetime of stale copies, measured from the `set`
    pub stale_timeout: Duration,
    /// Optional disk snapshot settings
    pub persist: Option<PersistOptions>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_items: 1000,
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(300),
            allow_stale_on_fail: true,
            stale_timeout: Duration::from_secs(1800),
            persist: None,
        }
    }
}

/// Outcome of [`Cache::get_or_load`].
#[derive(Debug, Clone)]
pub struct Loaded {
    pub value: Value,
    /// True when the value came from the stale map after a loader failure
    pub stale: bool,
}

#[derive(Default)]
struct Maps {
    live: HashMap<String, Entry>,
    stale: HashMap<String, Entry>,
}

/// In-memory cache with TTL, LRU eviction, and single-flight loads.
pub struct Cache {
    options: CacheOptions,
    maps: RwLock<Maps>,
    stats: StdMutex<CacheStats>,
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    persist_gate: Mutex<()>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Cache {
    /// Creates a cache with default options.
    pub fn new() -> Arc<Self> {
        Self::with_options(CacheOptions::default())
    }

    /// Creates a cache with the given options, seeding it from the disk
    /// snapshot when persistence with `load_on_startup` is configured.
    ///
    /// Must be called from within a tokio runtime: the cache spawns its
    /// cleanup (and, if configured, persistence) tasks here. The tasks hold
    /// only weak references and exit when the cache is dropped.
    pub fn with_options(options: CacheOptions) -> Arc<Self> {
        let mut maps = Maps::default();
        let mut stats = CacheStats::default();

        if let Some(persist_opts) = options.persist.as_ref().filter(|p| p.load_on_startup) {
            match persist::load_snapshot(persist_opts) {
                Ok(Some(snapshot)) => {
                    seed_from_snapshot(&mut maps, snapshot, &options);
                }
                Ok(None) => {}
                Err(err) => {
                    stats.persist_errors += 1;
                    tracing::warn!(error = %err, "failed to load cache snapshot");
                }
            }
        }

        let cache = Arc::new(Self {
            options,
            maps: RwLock::new(maps),
            stats: StdMutex::new(stats),
            flights: Mutex::new(HashMap::new()),
            persist_gate: Mutex::new(()),
            tasks: StdMutex::new(Vec::new()),
        });
        cache.spawn_maintenance();
        cache
    }

    /// Returns the value for `key` if present and not expired, updating the
    /// entry's last-access instant.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = now_nanos();
        {
            let maps = self.maps.read().await;
            match maps.live.get(key) {
                Some(entry) if now <= entry.expiration => {}
                _ => {
                    self.bump(|s| s.misses += 1);
                    return None;
                }
            }
        }

        let hit = {
            let mut maps = self.maps.write().await;
            match maps.live.get_mut(key) {
                Some(entry) if now <= entry.expiration => {
                    entry.last_access = now;
                    Some(entry.value.clone())
                }
                _ => None,
            }
        };

        match hit {
            Some(value) => {
                self.bump(|s| s.hits += 1);
                Some(value)
            }
            None => {
                self.bump(|s| s.misses += 1);
                None
            }
        }
    }

    /// Inserts or overwrites `key`. A zero `ttl` means the default TTL. When
    /// stale fallback is enabled the stale copy is refreshed with the stale
    /// horizon.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let ttl = if ttl.is_zero() {
            self.options.default_ttl
        } else {
            ttl
        };
        let now = now_nanos();
        let mut evicted = false;

        {
            let mut maps = self.maps.write().await;
            if self.options.max_items > 0
                && maps.live.len() >= self.options.max_items
                && !maps.live.contains_key(key)
            {
                if let Some(oldest) = maps
                    .live
                    .iter()
                    .min_by_key(|(_, e)| e.last_access)
                    .map(|(k, _)| k.clone())
                {
                    maps.live.remove(&oldest);
                    evicted = true;
                }
            }

            maps.live.insert(
                key.to_string(),
                Entry {
                    value: value.clone(),
                    expiration: now + duration_nanos(ttl),
                    last_access: now,
                },
            );
            if self.options.allow_stale_on_fail {
                maps.stale.insert(
                    key.to_string(),
                    Entry {
                        value,
                        expiration: now + duration_nanos(self.options.stale_timeout),
                        last_access: now,
                    },
                );
            }
        }

        if evicted {
            self.bump(|s| s.evictions += 1);
        }
    }

    /// Returns the cached value or invokes `loader` to produce it.
    ///
    /// Concurrent misses for the same key coalesce onto a single in-flight
    /// load: the loader runs at most once per resolution, and queued callers
    /// observe the freshly cached value. When the loader fails and a stale
    /// copy is within its horizon, the stale value is returned instead of the
    /// error.
    pub async fn get_or_load<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<Loaded>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(Loaded { value, stale: false });
        }

        let flight = {
            let mut flights = self.flights.lock().await;
            Arc::clone(
                flights
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = flight.lock().await;

        // Another flight may have resolved while we waited for the gate.
        if let Some(value) = self.get(key).await {
            return Ok(Loaded { value, stale: false });
        }

        match loader().await {
            Ok(value) => {
                self.set(key, value.clone(), ttl).await;
                Ok(Loaded { value, stale: false })
            }
            Err(err) => self.stale_fallback(key, err).await,
        }
    }

    /// Removes `key` from both the live and stale maps.
    pub async fn delete(&self, key: &str) {
        let mut maps = self.maps.write().await;
        maps.live.remove(key);
        maps.stale.remove(key);
    }

    /// Empties the cache.
    pub async fn clear(&self) {
        let mut maps = self.maps.write().await;
        maps.live.clear();
        maps.stale.clear();
    }

    /// Returns a snapshot of the statistics counters with the current size.
    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().unwrap().clone();
        stats.size = self.maps.read().await.live.len();
        stats
    }

    /// Removes expired entries from the live and stale maps and prunes idle
    /// flight gates.
    pub async fn cleanup(&self) {
        let now = now_nanos();
        {
            let mut maps = self.maps.write().await;
            maps.live.retain(|_, e| now <= e.expiration);
            maps.stale.retain(|_, e| now <= e.expiration);
        }
        let mut flights = self.flights.lock().await;
        flights.retain(|_, gate| Arc::strong_count(gate) > 1);
    }

    /// Snapshots the live map to disk.
    ///
    /// Snapshot writers are serialized against each other, not against
    /// readers. Failures never propagate; they increment `persist_errors`.
    pub async fn persist_to_disk(&self) {
        let Some(persist_opts) = self.options.persist.clone() else {
            return;
        };
        let _gate = self.persist_gate.lock().await;
        let snapshot = self.maps.read().await.live.clone();

        match persist::write_snapshot(&persist_opts, &snapshot).await {
            Ok(()) => self.bump(|s| s.persist_writes += 1),
            Err(err) => {
                self.bump(|s| s.persist_errors += 1);
                tracing::warn!(error = %err, "cache persistence failed");
            }
        }
    }

    /// Stops background tasks and takes a final snapshot when persistence is
    /// enabled.
    pub async fn stop(&self) {
        let handles: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for handle in handles {
            handle.abort();
        }
        if self.options.persist.is_some() {
            self.persist_to_disk().await;
        }
    }

    async fn stale_fallback(&self, key: &str, err: GatewayError) -> Result<Loaded> {
        if self.options.allow_stale_on_fail {
            let now = now_nanos();
            let stale_value = {
                let maps = self.maps.read().await;
                maps.stale
                    .get(key)
                    .filter(|e| now <= e.expiration)
                    .map(|e| e.value.clone())
            };
            if let Some(value) = stale_value {
                self.bump(|s| s.stale_served += 1);
                tracing::warn!(key, error = %err, "loader failed, serving stale entry");
                return Ok(Loaded { value, stale: true });
            }
        }
        Err(err)
    }

    fn spawn_maintenance(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();

        tasks.push(spawn_interval_task(
            Arc::downgrade(self),
            self.options.cleanup_interval,
            |cache| async move { cache.cleanup().await },
        ));

        if let Some(persist_opts) = &self.options.persist {
            tasks.push(spawn_interval_task(
                Arc::downgrade(self),
                persist_opts.save_interval,
                |cache| async move { cache.persist_to_disk().await },
            ));
        }
    }

    fn bump(&self, update: impl FnOnce(&mut CacheStats)) {
        update(&mut self.stats.lock().unwrap());
    }
}

fn spawn_interval_task<F, Fut>(cache: Weak<Cache>, period: Duration, op: F) -> JoinHandle<()>
where
    F: Fn(Arc<Cache>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // the first tick completes immediately
        loop {
            ticker.tick().await;
            let Some(cache) = cache.upgrade() else { break };
            op(cache).await;
        }
    })
}

fn seed_from_snapshot(maps: &mut Maps, snapshot: HashMap<String, Entry>, options: &CacheOptions) {
    let now = now_nanos();
    let stale_horizon = now + duration_nanos(options.stale_timeout);
    let mut loaded = 0usize;

    for (key, entry) in snapshot {
        if now <= entry.expiration {
            if options.allow_stale_on_fail {
                maps.stale.insert(
                    key.clone(),
                    Entry {
                        value: entry.value.clone(),
                        expiration: stale_horizon,
                        last_access: entry.last_access,
                    },
                );
            }
            maps.live.insert(key, entry);
            loaded += 1;
        }
    }

    if loaded > 0 {
        tracing::info!(entries = loaded, "cache seeded from disk snapshot");
    }
}

pub(crate) fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

fn duration_nanos(d: Duration) -> i64 {
    d.as_nanos() as i64
}
