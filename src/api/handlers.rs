//! API Handlers
//!
//! HTTP request handlers for the operator endpoints.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};

use crate::cache::CacheStore;
use crate::error::{CacheError, Result};
use crate::models::{
    HealthResponse, InvalidateRequest, InvalidateResponse, QueryStatsParams, QueryStatsResponse,
    StatsResponse,
};
use crate::query::{QueryExecutor, StatsTracker};

/// Application state shared across all handlers.
///
/// `query_stats` is set only when a [`QueryExecutor`] feeds it; without one
/// the router leaves `/query-stats` unmounted.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheStore>,
    pub query_stats: Option<Arc<StatsTracker>>,
}

impl AppState {
    /// State for a bare cache namespace.
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self {
            cache,
            query_stats: None,
        }
    }

    /// State sharing the cache and statistics of a running executor.
    pub fn for_executor(executor: &QueryExecutor) -> Self {
        Self {
            cache: executor.cache().clone(),
            query_stats: Some(executor.stats_tracker().clone()),
        }
    }
}

/// Handler for GET /health
///
/// Pings the cache backend.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from_ping(state.cache.ping().await))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.cache.stats().into())
}

/// Handler for POST /stats/reset
///
/// Zeroes the cache counters; the live-entry estimate is kept.
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.cache.reset_stats().await.into())
}

/// Handler for POST /invalidate
///
/// Removes every cache entry tagged with any of the requested tags.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let cleared = state.cache.clear_by_tags(&req.tags).await;
    Ok(Json(InvalidateResponse {
        tags: req.tags,
        cleared,
    }))
}

/// Handler for GET /query-stats
pub async fn query_stats_handler(
    State(tracker): State<Arc<StatsTracker>>,
    Query(params): Query<QueryStatsParams>,
) -> Json<QueryStatsResponse> {
    let mut entries = tracker.snapshot();
    if let Some(limit) = params.limit {
        entries.truncate(limit);
    }
    Json(QueryStatsResponse::new(tracker.len(), entries))
}
