//! Cache Entry Module
//!
//! Defines the envelope stored in the backend for every cached value.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Envelope schema version written by this crate.
pub const ENTRY_VERSION: u32 = 1;

// == Cache Entry ==
/// A cached value together with its expiry deadline and tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The stored value
    pub data: T,
    /// Expiration timestamp (Unix milliseconds)
    pub expires: u64,
    /// Envelope schema version
    pub version: u32,
    /// Advisory flag; payloads are currently stored uncompressed
    pub compressed: bool,
    /// Labels used for bulk invalidation
    pub tags: BTreeSet<String>,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates an entry that expires `ttl_seconds` from now.
    pub fn new(data: T, ttl_seconds: u64, tags: &[String]) -> Self {
        Self {
            data,
            expires: current_timestamp_ms() + ttl_seconds * 1000,
            version: ENTRY_VERSION,
            compressed: false,
            tags: tags.iter().cloned().collect(),
        }
    }

    // == Is Expired ==
    /// An entry stays valid up to and including its deadline.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expires
    }

    /// True if any of `tags` was attached to this entry.
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.tags.contains(tag))
    }
}

// == Entry Header ==
/// Payload-agnostic view of a stored envelope, used by namespace scans.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryHeader {
    pub expires: u64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl EntryHeader {
    /// Deserializes only the envelope metadata, skipping the payload type.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now > self.expires
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.tags.contains(tag))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
