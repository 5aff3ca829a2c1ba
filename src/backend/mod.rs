//! Backend Module
//!
//! The key/value contract consumed by the cache, plus the in-process
//! implementation shipped with the crate.

mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryBackend;

// == Pipeline Entry ==
/// One write in a batched `pipeline_set` call.
#[derive(Debug, Clone)]
pub struct PipelineEntry {
    pub key: String,
    pub ttl_secs: u64,
    pub value: String,
}

// == Backend Trait ==
/// Durable key/value backend the cache stores its envelopes in.
///
/// Every method may suspend on I/O. Implementations report failures as
/// [`crate::error::CacheError::Backend`]; the cache never lets them reach
/// its callers.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Reads a value, `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value without expiry.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Writes a value that the backend drops after `ttl_secs` seconds.
    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: String) -> Result<()>;

    /// Removes a key, returning the number of keys removed (0 or 1).
    async fn delete(&self, key: &str) -> Result<u64>;

    /// Reads many keys in one round trip; output is aligned with `keys`.
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Writes many expiring values in one round trip, reporting success per item.
    async fn pipeline_set(&self, entries: Vec<PipelineEntry>) -> Result<Vec<bool>>;

    /// Lists every live key starting with `prefix`.
    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Liveness probe.
    async fn ping(&self) -> bool;
}
