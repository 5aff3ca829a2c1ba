//! Query Statistics
//!
//! Per-query-shape timing, bounded by dropping the entries that have cost
//! the least total time.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tracked query shapes before eviction kicks in.
pub const MAX_TRACKED_QUERIES: usize = 1000;

/// Share of entries removed by one eviction pass.
const EVICTION_FRACTION: f64 = 0.2;

// == Query Stat Entry ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStatEntry {
    pub count: u64,
    /// Cumulative execution time in milliseconds
    pub total_time: f64,
    /// Always `total_time / count`
    pub avg_time: f64,
    pub last_executed: DateTime<Utc>,
}

impl QueryStatEntry {
    fn first(execution_time: f64) -> Self {
        Self {
            count: 1,
            total_time: execution_time,
            avg_time: execution_time,
            last_executed: Utc::now(),
        }
    }

    fn record(&mut self, execution_time: f64) {
        self.count += 1;
        self.total_time += execution_time;
        self.avg_time = self.total_time / self.count as f64;
        self.last_executed = Utc::now();
    }
}

// == Stats Tracker ==
/// Concurrent map from query hash to timing statistics.
///
/// There is no global lock: updates to different hashes proceed in parallel
/// and the capacity check runs after each update, so the map may briefly
/// hold a few entries more than its cap.
#[derive(Debug)]
pub struct StatsTracker {
    entries: DashMap<String, QueryStatEntry>,
    capacity: usize,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_QUERIES)
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    // == Record ==
    /// Adds one execution of `query_hash` taking `execution_time` ms.
    pub fn record(&self, query_hash: &str, execution_time: f64) {
        self.entries
            .entry(query_hash.to_string())
            .and_modify(|entry| entry.record(execution_time))
            .or_insert_with(|| QueryStatEntry::first(execution_time));

        if self.entries.len() > self.capacity {
            self.evict_cheapest();
        }
    }

    // == Evict Cheapest ==
    /// Drops the lowest-`total_time` fifth of the tracked entries.
    fn evict_cheapest(&self) -> usize {
        let mut totals: Vec<(String, f64)> = self
            .entries
            .iter()
            .map(|item| (item.key().clone(), item.value().total_time))
            .collect();
        totals.sort_by(|a, b| a.1.total_cmp(&b.1));

        let evict = (totals.len() as f64 * EVICTION_FRACTION).floor() as usize;
        for (hash, _) in totals.into_iter().take(evict) {
            self.entries.remove(&hash);
        }
        debug!("Evicted {} query stat entries", evict);
        evict
    }

    pub fn get(&self, query_hash: &str) -> Option<QueryStatEntry> {
        self.entries.get(query_hash).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    // == Snapshot ==
    /// All entries, most expensive (by total time) first.
    pub fn snapshot(&self) -> Vec<(String, QueryStatEntry)> {
        let mut all: Vec<(String, QueryStatEntry)> = self
            .entries
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect();
        all.sort_by(|a, b| b.1.total_time.total_cmp(&a.1.total_time));
        all
    }

    /// The `limit` entries with the highest average time.
    pub fn slowest(&self, limit: usize) -> Vec<(String, QueryStatEntry)> {
        let mut all = self.snapshot();
        all.sort_by(|a, b| b.1.avg_time.total_cmp(&a.1.avg_time));
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_record_keeps_average_consistent() {
        let tracker = StatsTracker::new();
        tracker.record("q", 10.0);
        tracker.record("q", 20.0);
        tracker.record("q", 60.0);

        let entry = tracker.get("q").unwrap();
        assert_eq!(entry.count, 3);
        assert_eq!(entry.total_time, 90.0);
        assert_eq!(entry.avg_time, entry.total_time / entry.count as f64);
    }

    #[test]
    fn test_eviction_keeps_most_expensive() {
        let tracker = StatsTracker::new();
        for i in 0..=MAX_TRACKED_QUERIES {
            tracker.record(&format!("q{i}"), i as f64);
        }

        assert!(tracker.len() <= MAX_TRACKED_QUERIES);
        assert_eq!(tracker.len(), 801);

        let survivors: HashSet<String> = tracker.snapshot().into_iter().map(|(hash, _)| hash).collect();
        let expected: HashSet<String> = (200..=MAX_TRACKED_QUERIES).map(|i| format!("q{i}")).collect();
        assert_eq!(survivors, expected);
    }

    #[test]
    fn test_no_eviction_at_capacity() {
        let tracker = StatsTracker::with_capacity(5);
        for i in 0..5 {
            tracker.record(&format!("q{i}"), 1.0);
        }
        assert_eq!(tracker.len(), 5);
    }

    #[test]
    fn test_snapshot_and_slowest_ordering() {
        let tracker = StatsTracker::new();
        tracker.record("cheap", 1.0);
        tracker.record("frequent", 5.0);
        tracker.record("frequent", 5.0);
        tracker.record("frequent", 5.0);
        tracker.record("slow", 12.0);

        let by_total: Vec<String> = tracker.snapshot().into_iter().map(|(h, _)| h).collect();
        assert_eq!(by_total, vec!["frequent", "slow", "cheap"]);

        let slowest = tracker.slowest(1);
        assert_eq!(slowest[0].0, "slow");
    }

    #[test]
    fn test_clear() {
        let tracker = StatsTracker::new();
        tracker.record("q", 1.0);
        tracker.clear();
        assert!(tracker.is_empty());
    }
}
