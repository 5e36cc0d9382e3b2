//! Disk snapshot reading and writing.
//!
//! Snapshots are a single JSON object mapping key → `{value, expiration,
//! last_access}` with nanosecond-since-epoch expirations. Writes go to a
//! sibling `.tmp` file first and are renamed into place, so a crash mid-write
//! leaves the previous snapshot intact.

use std::collections::HashMap;
use std::path::PathBuf;

use skygate_common::Result;

use crate::cache::{Entry, PersistOptions};

fn snapshot_path(options: &PersistOptions) -> PathBuf {
    options.directory.join(&options.filename)
}

fn temp_path(options: &PersistOptions) -> PathBuf {
    options.directory.join(format!("{}.tmp", options.filename))
}

/// Reads the snapshot file, returning `None` when it does not exist.
///
/// Called once at construction, before the cache is shared, so blocking file
/// I/O is acceptable here.
pub(crate) fn load_snapshot(options: &PersistOptions) -> Result<Option<HashMap<String, Entry>>> {
    let path = snapshot_path(options);
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&data)?))
}

/// Writes the snapshot atomically from the reader's point of view.
pub(crate) async fn write_snapshot(
    options: &PersistOptions,
    snapshot: &HashMap<String, Entry>,
) -> Result<()> {
    tokio::fs::create_dir_all(&options.directory).await?;

    let data = serde_json::to_vec(snapshot)?;
    let tmp = temp_path(options);
    tokio::fs::write(&tmp, &data).await?;
    tokio::fs::rename(&tmp, snapshot_path(options)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{now_nanos, Cache, CacheOptions};
    use serde_json::json;
    use std::time::Duration;

    fn persist_in(dir: &std::path::Path) -> PersistOptions {
        PersistOptions {
            directory: dir.to_path_buf(),
            filename: "cache_data.json".into(),
            save_interval: Duration::from_secs(600),
            load_on_startup: true,
        }
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let options = persist_in(dir.path());

        let mut snapshot = HashMap::new();
        snapshot.insert(
            "k".to_string(),
            Entry {
                value: json!({"count": 3}),
                expiration: now_nanos() + 60_000_000_000,
                last_access: now_nanos(),
            },
        );

        write_snapshot(&options, &snapshot).await.unwrap();
        let loaded = load_snapshot(&options).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["k"].value, json!({"count": 3}));
        assert_eq!(loaded["k"].expiration, snapshot["k"].expiration);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshot(&persist_in(dir.path())).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let options = persist_in(dir.path());
        write_snapshot(&options, &HashMap::new()).await.unwrap();

        assert!(snapshot_path(&options).exists());
        assert!(!temp_path(&options).exists());
    }

    #[tokio::test]
    async fn test_cache_reloads_unexpired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let options = CacheOptions {
            persist: Some(persist_in(dir.path())),
            ..CacheOptions::default()
        };

        {
            let cache = Cache::with_options(options.clone());
            cache.set("keep", json!("v"), Duration::from_secs(60)).await;
            cache.set("drop", json!("x"), Duration::from_millis(5)).await;
            tokio::time::sleep(Duration::from_millis(15)).await;
            cache.persist_to_disk().await;
            assert_eq!(cache.stats().await.persist_writes, 1);
        }

        let reloaded = Cache::with_options(options);
        assert_eq!(reloaded.get("keep").await, Some(json!("v")));
        assert_eq!(reloaded.get("drop").await, None);
    }

    #[tokio::test]
    async fn test_persist_errors_counted_not_propagated() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the snapshot file should be forces a write error.
        let options = persist_in(dir.path());
        std::fs::create_dir_all(snapshot_path(&options)).unwrap();

        let cache = Cache::with_options(CacheOptions {
            persist: Some(options),
            ..CacheOptions::default()
        });
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        cache.persist_to_disk().await;

        let stats = cache.stats().await;
        assert_eq!(stats.persist_writes, 0);
        assert!(stats.persist_errors >= 1);
        // The cache itself keeps working.
        assert_eq!(cache.get("k").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_stop_takes_final_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let options = CacheOptions {
            persist: Some(persist_in(dir.path())),
            ..CacheOptions::default()
        };

        let cache = Cache::with_options(options.clone());
        cache.set("k", json!("final"), Duration::from_secs(60)).await;
        cache.stop().await;

        let reloaded = Cache::with_options(options);
        assert_eq!(reloaded.get("k").await, Some(json!("final")));
    }
}
