//! Cache Store Module
//!
//! Tagged, TTL-aware cache over a [`KvBackend`]. Backend failures are counted
//! and swallowed: every operation degrades to a miss or a skipped write.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{KvBackend, PipelineEntry};
use crate::cache::key::generate_key;
use crate::cache::{current_timestamp_ms, CacheEntry, CacheStats, EntryHeader};
use crate::config::CacheConfig;
use crate::error::Result;

/// Suffix of the fixed key counters are persisted under.
const STATS_KEY_SUFFIX: &str = "__stats__";

// == Batch Item ==
/// One write in a [`CacheStore::mset`] call.
#[derive(Debug, Clone)]
pub struct MsetItem<T> {
    pub key: String,
    pub value: T,
    /// TTL in seconds, the configured default when None
    pub ttl: Option<u64>,
    pub tags: Vec<String>,
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

// == Cache Store ==
/// Shared cache namespace with fail-closed capacity and persisted statistics.
///
/// Cheap to share behind an `Arc`; every method takes `&self`. There is no
/// per-key locking, so concurrent writes to one key are last-write-wins and
/// the `size` counter is an estimate.
///
/// `size` follows an index of the physical keys this process wrote and their
/// deadlines. Expired keys leave the index (and `size`) on the next read or
/// capacity check; a full cache recounts the namespace before refusing.
pub struct CacheStore {
    backend: Arc<dyn KvBackend>,
    config: CacheConfig,
    stats: Mutex<CacheStats>,
    /// Physical key -> envelope deadline (Unix ms) of every counted entry
    tracked: Mutex<HashMap<String, u64>>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store with zeroed statistics.
    pub fn new(backend: Arc<dyn KvBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            stats: Mutex::new(CacheStats::new()),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    // == Open ==
    /// Creates a store, resuming the counters persisted by a previous process.
    ///
    /// `size` is recounted from the namespace rather than trusted.
    pub async fn open(backend: Arc<dyn KvBackend>, config: CacheConfig) -> Self {
        let store = Self::new(backend, config);
        if store.config.enable_compression {
            info!("Compression is advisory; cache entries are stored uncompressed");
        }
        match store.backend.get(&store.stats_key()).await {
            Ok(Some(raw)) => match decode::<CacheStats>(&raw) {
                Ok(stats) => {
                    info!(
                        "Restored cache stats: size={}, hits={}, misses={}",
                        stats.size, stats.hits, stats.misses
                    );
                    *store.lock_stats() = stats;
                }
                Err(err) => warn!("Ignoring unreadable persisted cache stats: {}", err),
            },
            Ok(None) => debug!("No persisted cache stats found"),
            Err(err) => warn!("Could not load persisted cache stats: {}", err),
        }
        store.reconcile_size().await;
        store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Physical key for a logical key and tag set.
    pub fn physical_key(&self, key: &str, tags: &[String]) -> String {
        generate_key(&self.config.key_prefix, key, tags)
    }

    fn stats_key(&self) -> String {
        format!("{}{}", self.config.key_prefix, STATS_KEY_SUFFIX)
    }

    fn lock_stats(&self) -> MutexGuard<'_, CacheStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_stats(&self, update: impl FnOnce(&mut CacheStats)) -> CacheStats {
        let mut stats = self.lock_stats();
        update(&mut stats);
        stats.clone()
    }

    // == Live Entry Index ==
    fn lock_tracked(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a write; true if the key was not already counted in `size`.
    fn track(&self, physical: &str, expires: u64) -> bool {
        self.lock_tracked()
            .insert(physical.to_string(), expires)
            .is_none()
    }

    fn untrack(&self, physical: &str) -> bool {
        self.lock_tracked().remove(physical).is_some()
    }

    fn is_tracked(&self, physical: &str) -> bool {
        self.lock_tracked().contains_key(physical)
    }

    /// Drops index entries past their deadline and shrinks `size` to match.
    fn prune_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let pruned = {
            let mut tracked = self.lock_tracked();
            let before = tracked.len();
            tracked.retain(|_, expires| now <= *expires);
            before - tracked.len()
        };
        if pruned > 0 {
            debug!("Pruned {} expired entries from the size estimate", pruned);
            self.with_stats(|stats| stats.shrink(pruned));
        }
        pruned
    }

    /// Free slots under `max_size`, recounting the namespace when it looks full.
    async fn remaining_capacity(&self) -> usize {
        self.prune_expired();
        let size = self.lock_stats().size;
        let size = if size >= self.config.max_size {
            self.reconcile_size().await
        } else {
            size
        };
        self.config.max_size.saturating_sub(size)
    }

    // == Reconcile Size ==
    /// Recounts unexpired entries in the namespace, rebuilding the live-entry
    /// index and `size` from what the backend actually holds.
    ///
    /// Returns the new size; on backend failure the current estimate is kept.
    pub async fn reconcile_size(&self) -> usize {
        let Some(keys) = self.namespace_keys().await else {
            return self.lock_stats().size;
        };
        let values = match self.backend.multi_get(&keys).await {
            Ok(values) => values,
            Err(err) => {
                warn!("Failed to read cache namespace: {}", err);
                self.with_stats(CacheStats::record_error);
                return self.lock_stats().size;
            }
        };

        let now = current_timestamp_ms();
        let live: HashMap<String, u64> = keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, raw)| {
                let header = EntryHeader::parse(&raw?).ok()?;
                (!header.is_expired_at(now)).then_some((key, header.expires))
            })
            .collect();

        let size = live.len();
        *self.lock_tracked() = live;
        self.with_stats(|stats| stats.size = size);
        debug!("Reconciled cache size to {}", size);
        size
    }

    // == Get ==
    /// Returns the value stored under `key` and `tags`, if present and unexpired.
    ///
    /// An expired envelope counts as a miss and is deleted from the backend.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, tags: &[String]) -> Option<T> {
        let physical = self.physical_key(key, tags);
        match self.backend.get(&physical).await {
            Ok(raw) => self.resolve(&physical, raw).await,
            Err(err) => {
                warn!("Cache read failed for {}: {}", physical, err);
                self.with_stats(|stats| {
                    stats.record_error();
                    stats.record_miss();
                });
                None
            }
        }
    }

    /// Turns a raw backend read into a hit or a miss, pruning expired entries.
    async fn resolve<T: DeserializeOwned>(&self, physical: &str, raw: Option<String>) -> Option<T> {
        let Some(raw) = raw else {
            // A counted key the backend no longer holds has expired there
            if self.untrack(physical) {
                let snapshot = self.with_stats(|stats| {
                    stats.record_miss();
                    stats.shrink(1);
                });
                self.persist_stats(&snapshot).await;
            } else {
                self.with_stats(CacheStats::record_miss);
            }
            return None;
        };

        let entry: CacheEntry<T> = match decode(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Discarding unreadable cache entry {}: {}", physical, err);
                self.with_stats(|stats| {
                    stats.record_error();
                    stats.record_miss();
                });
                return None;
            }
        };

        if entry.is_expired() {
            debug!("Cache entry {} expired, pruning", physical);
            let removed = self.backend.delete(physical).await.unwrap_or_else(|err| {
                warn!("Failed to prune expired entry {}: {}", physical, err);
                0
            });
            let counted = self.untrack(physical) || removed > 0;
            let snapshot = self.with_stats(|stats| {
                stats.record_miss();
                if counted {
                    stats.shrink(1);
                }
            });
            self.persist_stats(&snapshot).await;
            return None;
        }

        self.with_stats(CacheStats::record_hit);
        Some(entry.data)
    }

    // == Set ==
    /// Stores `value` for `ttl` seconds (default TTL when None).
    ///
    /// Returns false without touching the backend once the live-entry count
    /// reaches `max_size`; nothing is evicted to make room. Overwriting a
    /// counted key never needs room.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
        tags: &[String],
    ) -> bool {
        let physical = self.physical_key(key, tags);
        if !self.is_tracked(&physical) && self.remaining_capacity().await == 0 {
            debug!("Cache full ({} entries), rejecting set", self.config.max_size);
            return false;
        }

        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let entry = CacheEntry::new(value, ttl, tags);
        let raw = match encode(&entry) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Failed to serialize cache entry {}: {}", physical, err);
                self.with_stats(CacheStats::record_error);
                return false;
            }
        };

        match self.backend.set_with_expiry(&physical, ttl, raw).await {
            Ok(()) => {
                let is_new = self.track(&physical, entry.expires);
                let snapshot = self.with_stats(|stats| stats.record_set(is_new));
                self.persist_stats(&snapshot).await;
                true
            }
            Err(err) => {
                warn!("Cache write failed for {}: {}", physical, err);
                self.with_stats(CacheStats::record_error);
                false
            }
        }
    }

    // == Delete ==
    /// Removes the entry stored under `key` and `tags`; true if one existed.
    pub async fn delete(&self, key: &str, tags: &[String]) -> bool {
        let physical = self.physical_key(key, tags);
        match self.backend.delete(&physical).await {
            Ok(count) => {
                let removed = count > 0;
                let counted = self.untrack(&physical) || removed;
                let snapshot = self.with_stats(|stats| stats.record_delete(counted));
                self.persist_stats(&snapshot).await;
                removed
            }
            Err(err) => {
                warn!("Cache delete failed for {}: {}", physical, err);
                self.with_stats(CacheStats::record_error);
                false
            }
        }
    }

    /// Data keys currently in the namespace, excluding the stats key.
    async fn namespace_keys(&self) -> Option<Vec<String>> {
        let stats_key = self.stats_key();
        match self.backend.list_keys_by_prefix(&self.config.key_prefix).await {
            Ok(keys) => Some(keys.into_iter().filter(|key| *key != stats_key).collect()),
            Err(err) => {
                warn!("Failed to list cache namespace: {}", err);
                self.with_stats(CacheStats::record_error);
                None
            }
        }
    }

    // == Clear By Tags ==
    /// Deletes every entry whose stored tags intersect `tags`.
    ///
    /// This scans the whole namespace (O(n) in live entries). It is meant for
    /// caches of a few thousand entries and does not scale far beyond that.
    pub async fn clear_by_tags(&self, tags: &[String]) -> usize {
        if tags.is_empty() {
            return 0;
        }
        let Some(keys) = self.namespace_keys().await else {
            return 0;
        };
        let values = match self.backend.multi_get(&keys).await {
            Ok(values) => values,
            Err(err) => {
                warn!("Failed to read cache namespace: {}", err);
                self.with_stats(CacheStats::record_error);
                return 0;
            }
        };

        let mut cleared = 0;
        for (key, raw) in keys.iter().zip(values) {
            let Some(raw) = raw else { continue };
            let header = match EntryHeader::parse(&raw) {
                Ok(header) => header,
                Err(err) => {
                    debug!("Skipping unreadable entry {} during tag scan: {}", key, err);
                    continue;
                }
            };
            if !header.has_any_tag(tags) {
                continue;
            }
            match self.backend.delete(key).await {
                Ok(count) if count > 0 => {
                    cleared += 1;
                    self.untrack(key);
                    self.with_stats(|stats| stats.record_delete(true));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("Failed to delete {} during tag clear: {}", key, err);
                    self.with_stats(CacheStats::record_error);
                }
            }
        }

        let snapshot = self.lock_stats().clone();
        self.persist_stats(&snapshot).await;
        info!("Cleared {} cache entries tagged {:?}", cleared, tags);
        cleared
    }

    // == Clear ==
    /// Removes every entry in the namespace and zeroes the size estimate.
    pub async fn clear(&self) -> usize {
        let Some(keys) = self.namespace_keys().await else {
            return 0;
        };

        let mut cleared = 0;
        for key in &keys {
            match self.backend.delete(key).await {
                Ok(count) => cleared += count as usize,
                Err(err) => {
                    warn!("Failed to delete {} during clear: {}", key, err);
                    self.with_stats(CacheStats::record_error);
                }
            }
        }

        self.lock_tracked().clear();
        let snapshot = self.with_stats(|stats| {
            stats.deletes += cleared as u64;
            stats.size = 0;
        });
        self.persist_stats(&snapshot).await;
        info!("Cleared {} cache entries", cleared);
        cleared
    }

    // == Multi Get ==
    /// Batched [`CacheStore::get`]; output is aligned with `keys`.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String], tags: &[String]) -> Vec<Option<T>> {
        let physical: Vec<String> = keys.iter().map(|key| self.physical_key(key, tags)).collect();
        let raws = match self.backend.multi_get(&physical).await {
            Ok(raws) => raws,
            Err(err) => {
                warn!("Batched cache read failed: {}", err);
                self.with_stats(|stats| {
                    stats.record_error();
                    stats.misses += keys.len() as u64;
                });
                return keys.iter().map(|_| None).collect();
            }
        };

        let mut values = Vec::with_capacity(raws.len());
        for (key, raw) in physical.iter().zip(raws) {
            values.push(self.resolve(key, raw).await);
        }
        values
    }

    // == Multi Set ==
    /// Batched [`CacheStore::set`] reporting success per item.
    ///
    /// Items past the remaining capacity are refused individually; the rest
    /// are written in one pipeline.
    pub async fn mset<T: Serialize>(&self, items: &[MsetItem<T>]) -> Vec<bool> {
        let mut results = vec![false; items.len()];
        let mut remaining = self.remaining_capacity().await;

        let mut written = Vec::new();
        let mut batch = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let physical = self.physical_key(&item.key, &item.tags);
            let overwrite = self.is_tracked(&physical);
            if !overwrite && remaining == 0 {
                debug!("Cache full, refusing batched set for {}", item.key);
                continue;
            }
            let ttl = item.ttl.unwrap_or(self.config.default_ttl);
            let entry = CacheEntry::new(&item.value, ttl, &item.tags);
            match encode(&entry) {
                Ok(value) => {
                    if !overwrite {
                        remaining -= 1;
                    }
                    written.push((index, physical.clone(), entry.expires));
                    batch.push(PipelineEntry {
                        key: physical,
                        ttl_secs: ttl,
                        value,
                    });
                }
                Err(err) => {
                    warn!("Failed to serialize cache entry {}: {}", item.key, err);
                    self.with_stats(CacheStats::record_error);
                }
            }
        }

        if batch.is_empty() {
            return results;
        }

        match self.backend.pipeline_set(batch).await {
            Ok(outcomes) => {
                for ((index, physical, expires), ok) in written.into_iter().zip(outcomes) {
                    results[index] = ok;
                    if ok {
                        let is_new = self.track(&physical, expires);
                        self.with_stats(|stats| stats.record_set(is_new));
                    } else {
                        self.with_stats(CacheStats::record_error);
                    }
                }
                let snapshot = self.lock_stats().clone();
                self.persist_stats(&snapshot).await;
            }
            Err(err) => {
                warn!("Batched cache write failed: {}", err);
                self.with_stats(CacheStats::record_error);
            }
        }
        results
    }

    // == Get Or Set ==
    /// Cache-aside helper: returns the cached value or awaits `loader` and
    /// caches what it produces. Loader errors are returned untouched.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        tags: &[String],
        ttl: Option<u64>,
        loader: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get(key, tags).await {
            return Ok(value);
        }
        let value = loader().await?;
        self.set(key, &value, ttl, tags).await;
        Ok(value)
    }

    // == Stats ==
    /// Returns a snapshot of the current counters.
    pub fn stats(&self) -> CacheStats {
        self.lock_stats().clone()
    }

    /// Zeroes every counter except `size` and stamps `last_reset`.
    pub async fn reset_stats(&self) -> CacheStats {
        let snapshot = self.with_stats(|stats| {
            *stats = CacheStats {
                size: stats.size,
                last_reset: Utc::now(),
                ..CacheStats::default()
            };
        });
        self.persist_stats(&snapshot).await;
        info!("Cache statistics reset");
        snapshot
    }

    /// Persists the current counters.
    pub async fn flush_stats(&self) {
        let snapshot = self.stats();
        self.persist_stats(&snapshot).await;
    }

    async fn persist_stats(&self, stats: &CacheStats) {
        let raw = match encode(stats) {
            Ok(raw) => raw,
            Err(err) => {
                debug!("Failed to encode cache stats: {}", err);
                return;
            }
        };
        if let Err(err) = self.backend.set(&self.stats_key(), raw).await {
            debug!("Failed to persist cache stats: {}", err);
        }
    }

    // == Lifecycle ==
    /// True if the backend answers.
    pub async fn ping(&self) -> bool {
        self.backend.ping().await
    }

    /// Flushes statistics before the process exits.
    pub async fn shutdown(&self) {
        self.flush_stats().await;
        info!("Cache store shut down");
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::{CacheError, Result};
    use async_trait::async_trait;
    use std::time::Duration;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn config(max_size: usize) -> CacheConfig {
        CacheConfig {
            max_size,
            ..CacheConfig::default()
        }
    }

    fn store_with(max_size: usize) -> (Arc<MemoryBackend>, CacheStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(backend.clone(), config(max_size));
        (backend, store)
    }

    /// Backend whose every call fails.
    struct FailingBackend;

    #[async_trait]
    impl KvBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
        async fn set(&self, _key: &str, _value: String) -> Result<()> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
        async fn set_with_expiry(&self, _key: &str, _ttl: u64, _value: String) -> Result<()> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
        async fn delete(&self, _key: &str) -> Result<u64> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
        async fn multi_get(&self, _keys: &[String]) -> Result<Vec<Option<String>>> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
        async fn pipeline_set(&self, _entries: Vec<PipelineEntry>) -> Result<Vec<bool>> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
        async fn list_keys_by_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
        async fn ping(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (_, store) = store_with(100);

        assert!(store.set("key1", &"value1".to_string(), None, &[]).await);
        let value: Option<String> = store.get("key1", &[]).await;

        assert_eq!(value.as_deref(), Some("value1"));
        let stats = store.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_get_is_tag_sensitive() {
        let (_, store) = store_with(100);
        store.set("k", &42u32, None, &tags(&["a"])).await;

        assert_eq!(store.get::<u32>("k", &tags(&["a"])).await, Some(42));
        assert_eq!(store.get::<u32>("k", &tags(&["b"])).await, None);
        assert_eq!(store.get::<u32>("k", &[]).await, None);
    }

    #[tokio::test]
    async fn test_get_nonexistent_counts_miss() {
        let (_, store) = store_with(100);

        assert_eq!(store.get::<String>("nope", &[]).await, None);
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_expired_envelope_is_pruned() {
        let (backend, store) = store_with(100);
        let physical = store.physical_key("stale", &[]);
        let mut entry = CacheEntry::new("old".to_string(), 60, &[]);
        entry.expires = 1;
        // Backend still holds the key; only the envelope deadline has passed
        backend
            .set(&physical, serde_json::to_string(&entry).unwrap())
            .await
            .unwrap();

        assert_eq!(store.get::<String>("stale", &[]).await, None);
        assert_eq!(store.stats().misses, 1);
        assert_eq!(backend.get(&physical).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let (_, store) = store_with(100);
        store.set("k", &"v".to_string(), Some(1), &[]).await;

        assert!(store.get::<String>("k", &[]).await.is_some());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(store.get::<String>("k", &[]).await.is_none());
        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn test_expired_entry_frees_capacity_after_read() {
        let (_, store) = store_with(1);
        assert!(store.set("a", &"v".to_string(), Some(1), &[]).await);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.get::<String>("a", &[]).await, None);
        assert_eq!(store.stats().size, 0);

        assert!(store.set("b", &"v".to_string(), None, &[]).await);
        assert_eq!(store.stats().size, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_frees_capacity_without_read() {
        let (_, store) = store_with(1);
        assert!(store.set("a", &1, Some(1), &[]).await);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(store.set("b", &2, None, &[]).await);
        assert_eq!(store.stats().size, 1);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_grow_size() {
        let (_, store) = store_with(2);

        assert!(store.set("k", &1, None, &[]).await);
        assert!(store.set("k", &2, None, &[]).await);
        assert_eq!(store.stats().size, 1);
        assert_eq!(store.stats().sets, 2);

        assert!(store.set("other", &3, None, &[]).await);
        assert!(!store.set("third", &4, None, &[]).await);
        // A counted key can still be refreshed at capacity
        assert!(store.set("k", &5, None, &[]).await);
        assert_eq!(store.get::<i32>("k", &[]).await, Some(5));
        assert_eq!(store.stats().size, 2);
    }

    #[tokio::test]
    async fn test_full_cache_recounts_before_refusing() {
        let (backend, store) = store_with(2);
        store.set("a", &1, None, &[]).await;
        store.set("b", &2, None, &[]).await;
        // Removed behind the store's back
        backend.delete(&store.physical_key("a", &[])).await.unwrap();

        assert!(store.set("c", &3, None, &[]).await);
        assert_eq!(store.stats().size, 2);
    }

    #[tokio::test]
    async fn test_open_recounts_stale_persisted_size() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = CacheStore::new(backend.clone(), config(100));
            store.set("live", &1, None, &[]).await;
            store.set("gone", &2, None, &[]).await;
            store.shutdown().await;
            backend
                .delete(&store.physical_key("gone", &[]))
                .await
                .unwrap();
        }

        let reopened = CacheStore::open(backend, config(100)).await;
        assert_eq!(reopened.stats().size, 1);
        assert_eq!(reopened.stats().sets, 2);
    }

    #[tokio::test]
    async fn test_reconcile_ignores_expired_envelopes() {
        let (backend, store) = store_with(100);
        let mut entry = CacheEntry::new(1u32, 60, &[]);
        entry.expires = 1;
        backend
            .set(&store.physical_key("stale", &[]), serde_json::to_string(&entry).unwrap())
            .await
            .unwrap();
        store.set("fresh", &2u32, None, &[]).await;

        assert_eq!(store.reconcile_size().await, 1);
        assert_eq!(store.stats().size, 1);
    }

    #[tokio::test]
    async fn test_set_refused_at_capacity() {
        let (_, store) = store_with(2);

        assert!(store.set("a", &1, None, &[]).await);
        assert!(store.set("b", &2, None, &[]).await);
        assert!(!store.set("c", &3, None, &[]).await);

        let stats = store.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.sets, 2);
        assert_eq!(store.get::<i32>("c", &[]).await, None);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_, store) = store_with(100);
        store.set("k", &1, None, &tags(&["t"])).await;

        assert!(!store.delete("k", &[]).await);
        assert!(store.delete("k", &tags(&["t"])).await);

        let stats = store.stats();
        assert_eq!(stats.deletes, 2);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn test_clear_by_tags() {
        let (_, store) = store_with(100);
        store.set("a", &1, None, &tags(&["x"])).await;
        store.set("b", &2, None, &tags(&["x", "y"])).await;
        store.set("c", &3, None, &tags(&["y"])).await;
        store.set("d", &4, None, &[]).await;

        let cleared = store.clear_by_tags(&tags(&["x"])).await;

        assert_eq!(cleared, 2);
        assert_eq!(store.get::<i32>("a", &tags(&["x"])).await, None);
        assert_eq!(store.get::<i32>("b", &tags(&["x", "y"])).await, None);
        assert_eq!(store.get::<i32>("c", &tags(&["y"])).await, Some(3));
        assert_eq!(store.get::<i32>("d", &[]).await, Some(4));
        assert_eq!(store.stats().size, 2);
    }

    #[tokio::test]
    async fn test_clear_keeps_persisted_stats() {
        let (backend, store) = store_with(100);
        store.set("a", &1, None, &[]).await;
        store.set("b", &2, None, &[]).await;

        assert_eq!(store.clear().await, 2);
        assert_eq!(store.stats().size, 0);
        assert!(backend.get(&store.stats_key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_mget_mixes_hits_and_misses() {
        let (_, store) = store_with(100);
        store.set("a", &1, None, &[]).await;
        store.set("c", &3, None, &[]).await;

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values: Vec<Option<i32>> = store.mget(&keys, &[]).await;

        assert_eq!(values, vec![Some(1), None, Some(3)]);
        let stats = store.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_mset_partial_acceptance_at_capacity() {
        let (_, store) = store_with(2);
        let items: Vec<MsetItem<i32>> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, key)| MsetItem {
                key: key.to_string(),
                value: i as i32,
                ttl: None,
                tags: tags(&["batch"]),
            })
            .collect();

        let results = store.mset(&items).await;

        assert_eq!(results, vec![true, true, false]);
        assert_eq!(store.stats().size, 2);
        assert_eq!(store.get::<i32>("b", &tags(&["batch"])).await, Some(1));
    }

    #[tokio::test]
    async fn test_get_or_set_loads_once() {
        let (_, store) = store_with(100);

        let first: std::result::Result<String, String> = store
            .get_or_set("k", &[], None, || async { Ok("loaded".to_string()) })
            .await;
        let second: std::result::Result<String, String> = store
            .get_or_set("k", &[], None, || async { Err("loader called twice".to_string()) })
            .await;

        assert_eq!(first.unwrap(), "loaded");
        assert_eq!(second.unwrap(), "loaded");
    }

    #[tokio::test]
    async fn test_backend_failures_degrade() {
        let store = CacheStore::new(Arc::new(FailingBackend), config(100));

        assert!(!store.set("k", &1, None, &[]).await);
        assert_eq!(store.get::<i32>("k", &[]).await, None);
        assert!(!store.delete("k", &[]).await);
        assert_eq!(store.clear_by_tags(&tags(&["x"])).await, 0);
        assert!(!store.ping().await);

        let stats = store.stats();
        assert_eq!(stats.errors, 4);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn test_open_restores_persisted_stats() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = CacheStore::new(backend.clone(), config(100));
            store.set("a", &1, None, &[]).await;
            store.set("b", &2, None, &[]).await;
            store.shutdown().await;
        }

        let reopened = CacheStore::open(backend, config(100)).await;
        let stats = reopened.stats();
        assert_eq!(stats.sets, 2);
        assert_eq!(stats.size, 2);
    }

    #[tokio::test]
    async fn test_reset_stats_keeps_size() {
        let (_, store) = store_with(100);
        store.set("a", &1, None, &[]).await;
        store.get::<i32>("a", &[]).await;
        let before = store.stats().last_reset;

        let reset = store.reset_stats().await;

        assert_eq!(reset.hits, 0);
        assert_eq!(reset.sets, 0);
        assert_eq!(reset.size, 1);
        assert!(reset.last_reset >= before);
    }
}
