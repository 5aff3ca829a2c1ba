//! In-Memory Backend
//!
//! HashMap storage with per-key expiry, standing in for an external
//! key/value server when the cache runs in-process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KvBackend, PipelineEntry};
use crate::cache::current_timestamp_ms;
use crate::error::Result;

// == Stored Value ==
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    expires_at: Option<u64>,
}

impl StoredValue {
    fn new(value: String, ttl_secs: Option<u64>) -> Self {
        let expires_at = ttl_secs.map(|ttl| current_timestamp_ms() + ttl * 1000);
        Self { value, expires_at }
    }

    /// Expired once the current time reaches the deadline.
    fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now >= expires)
    }
}

// == Memory Backend ==
/// Process-local [`KvBackend`].
///
/// Expired keys are hidden from reads immediately and physically removed by
/// [`MemoryBackend::purge_expired`], which the maintenance task calls.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // == Purge Expired ==
    /// Removes all expired keys, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, stored| !stored.is_expired(now));
        before - entries.len()
    }

    /// Number of physically stored keys, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = current_timestamp_ms();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StoredValue::new(value, None));
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: String) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StoredValue::new(value, Some(ttl_secs)));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let now = current_timestamp_ms();
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(stored) if !stored.is_expired(now) => Ok(1),
            _ => Ok(0),
        }
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let now = current_timestamp_ms();
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|stored| !stored.is_expired(now))
                    .map(|stored| stored.value.clone())
            })
            .collect())
    }

    async fn pipeline_set(&self, batch: Vec<PipelineEntry>) -> Result<Vec<bool>> {
        let mut entries = self.entries.write().await;
        let results = batch
            .into_iter()
            .map(|entry| {
                entries.insert(entry.key, StoredValue::new(entry.value, Some(entry.ttl_secs)));
                true
            })
            .collect();
        Ok(results)
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let now = current_timestamp_ms();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && !stored.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> bool {
        true
    }
}
