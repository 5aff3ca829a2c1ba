//! Cache Statistics Module
//!
//! Tracks cache counters. The store persists them after every mutation so a
//! restarted process resumes counting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (absent, expired or unreadable)
    pub misses: u64,
    /// Number of accepted writes
    pub sets: u64,
    /// Number of explicit deletes
    pub deletes: u64,
    /// Number of backend or serialization failures
    pub errors: u64,
    /// Approximate number of live entries
    pub size: usize,
    /// When the counters were last reset
    pub last_reset: DateTime<Utc>,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self {
            hits: 0,
            misses: 0,
            sets: 0,
            deletes: 0,
            errors: 0,
            size: 0,
            last_reset: Utc::now(),
        }
    }
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    // == Record Set ==
    /// Counts an accepted write; only a key not already counted grows `size`.
    pub fn record_set(&mut self, new_entry: bool) {
        self.sets += 1;
        if new_entry {
            self.size += 1;
        }
    }

    // == Record Delete ==
    /// Counts an explicit delete; `removed` is false when no counted entry went away.
    pub fn record_delete(&mut self, removed: bool) {
        self.deletes += 1;
        if removed {
            self.shrink(1);
        }
    }

    /// Lowers the live-entry estimate, flooring at zero.
    pub fn shrink(&mut self, by: usize) {
        self.size = self.size.saturating_sub(by);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.sets, 0);
        assert_eq!(stats.deletes, 0);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_delete_floors_size_at_zero() {
        let mut stats = CacheStats::new();
        stats.record_delete(true);
        stats.record_delete(true);
        assert_eq!(stats.deletes, 2);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_set_then_delete() {
        let mut stats = CacheStats::new();
        stats.record_set(true);
        stats.record_set(true);
        stats.record_delete(true);
        stats.record_delete(false);
        assert_eq!(stats.sets, 2);
        assert_eq!(stats.deletes, 2);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_overwrite_keeps_size() {
        let mut stats = CacheStats::new();
        stats.record_set(true);
        stats.record_set(false);
        assert_eq!(stats.sets, 2);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_stats_survive_json_roundtrip() {
        let mut stats = CacheStats::new();
        stats.record_set(true);
        stats.record_error();
        let raw = serde_json::to_string(&stats).unwrap();
        let restored: CacheStats = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored, stats);
    }
}
