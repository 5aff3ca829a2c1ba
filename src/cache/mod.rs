//! Cache Module
//!
//! Tagged key/value cache with TTL expiry, a fail-closed size cap and
//! persisted statistics.

mod entry;
mod key;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, EntryHeader, ENTRY_VERSION};
pub use key::{generate_key, sha256_hex};
pub use stats::CacheStats;
pub use store::{CacheStore, MsetItem};
