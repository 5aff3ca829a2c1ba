//! Response DTOs for the operator API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::query::QueryStatEntry;

/// Response body for GET /stats and POST /stats/reset
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Cache hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for POST /invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub tags: Vec<String>,
    pub cleared: usize,
}

/// One tracked query shape in GET /query-stats
#[derive(Debug, Clone, Serialize)]
pub struct QueryStatItem {
    pub query_hash: String,
    #[serde(flatten)]
    pub entry: QueryStatEntry,
}

/// Response body for GET /query-stats
#[derive(Debug, Clone, Serialize)]
pub struct QueryStatsResponse {
    /// Number of query shapes currently tracked
    pub tracked: usize,
    /// Entries sorted by total time, most expensive first
    pub queries: Vec<QueryStatItem>,
}

impl QueryStatsResponse {
    pub fn new(tracked: usize, entries: Vec<(String, QueryStatEntry)>) -> Self {
        Self {
            tracked,
            queries: entries
                .into_iter()
                .map(|(query_hash, entry)| QueryStatItem { query_hash, entry })
                .collect(),
        }
    }
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" when the cache backend answers, "degraded" otherwise
    pub status: String,
    pub cache_backend: bool,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn from_ping(cache_backend: bool) -> Self {
        let status = if cache_backend { "healthy" } else { "degraded" };
        Self {
            status: status.to_string(),
            cache_backend,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_response_flattens_counters() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        let json = serde_json::to_value(StatsResponse::from(stats)).unwrap();

        assert_eq!(json["hits"], 1);
        assert_eq!(json["misses"], 1);
        assert_eq!(json["hit_rate"], 0.5);
        assert!(json.get("last_reset").is_some());
    }

    #[test]
    fn test_health_response_status() {
        assert_eq!(HealthResponse::from_ping(true).status, "healthy");
        assert_eq!(HealthResponse::from_ping(false).status, "degraded");
    }

    #[test]
    fn test_query_stats_response_keeps_order() {
        let entry = |total: f64| QueryStatEntry {
            count: 1,
            total_time: total,
            avg_time: total,
            last_executed: chrono::Utc::now(),
        };
        let resp = QueryStatsResponse::new(2, vec![("b".to_string(), entry(9.0)), ("a".to_string(), entry(1.0))]);
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["tracked"], 2);
        assert_eq!(json["queries"][0]["query_hash"], "b");
        assert_eq!(json["queries"][0]["total_time"], 9.0);
    }
}
