//! Query Executor
//!
//! Cache-aside query execution: security screening, cache lookup, timed and
//! retried engine calls, cache population and per-query statistics.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{sha256_hex, CacheStore};
use crate::config::ExecutorConfig;
use crate::error::QueryError;
use crate::query::engine::{DataEngine, EngineOutput};
use crate::query::maintenance::MaintenanceTask;
use crate::query::retry::{attempt_with_timeout, backoff_delay, is_non_retryable, AttemptFailure};
use crate::query::security::{
    SecurityEvent, SecurityEventSink, SecurityValidator, Severity, TracingSecurityEvents,
};
use crate::query::stats::{QueryStatEntry, StatsTracker};

/// Tag attached to every cached query result.
pub const QUERY_CACHE_TAG: &str = "query";

// == Query Options ==
/// Per-call execution settings.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub enable_cache: bool,
    /// TTL in seconds for the cached result, the cache default when None
    pub cache_ttl: Option<u64>,
    /// Overrides the derived query hash as cache key
    pub cache_key: Option<String>,
    /// Extra tags, stored alongside [`QUERY_CACHE_TAG`]
    pub cache_tags: Vec<String>,
    /// Bound on each attempt, the executor default when None
    pub timeout: Option<Duration>,
    /// Retries after the first attempt, capped by `max_retries`
    pub retries: u32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_ttl: None,
            cache_key: None,
            cache_tags: Vec::new(),
            timeout: None,
            retries: 0,
        }
    }
}

impl QueryOptions {
    pub fn uncached() -> Self {
        Self {
            enable_cache: false,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.cache_ttl = Some(ttl_secs);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

// == Query Result ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub data: Vec<Value>,
    /// Milliseconds spent executing (the original execution, for cache hits)
    pub execution_time: f64,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_plan: Option<Vec<Value>>,
}

/// Liveness summary returned by [`QueryExecutor::health_check`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutorHealth {
    pub cache_backend: bool,
    pub tracked_queries: usize,
}

// == Query Hash ==
/// Deterministic hash of the whitespace-normalized query and its parameters.
pub fn hash_query(query: &str, params: &[Value]) -> String {
    let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
    let params = Value::Array(params.to_vec());
    sha256_hex(&format!("{normalized}|{params}"))
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

// == Query Executor ==
pub struct QueryExecutor {
    engine: Arc<dyn DataEngine>,
    cache: Arc<CacheStore>,
    validator: SecurityValidator,
    stats: Arc<StatsTracker>,
    events: Arc<dyn SecurityEventSink>,
    config: ExecutorConfig,
}

impl QueryExecutor {
    // == Constructor ==
    /// Creates an executor with the built-in security rules, a private stats
    /// tracker and the tracing event sink.
    pub fn new(engine: Arc<dyn DataEngine>, cache: Arc<CacheStore>, config: ExecutorConfig) -> Self {
        Self {
            engine,
            cache,
            validator: SecurityValidator::new(),
            stats: Arc::new(StatsTracker::new()),
            events: Arc::new(TracingSecurityEvents),
            config,
        }
    }

    /// Shares a stats tracker, e.g. with the operator API.
    pub fn with_stats_tracker(mut self, stats: Arc<StatsTracker>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_validator(mut self, validator: SecurityValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn SecurityEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn stats_tracker(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    fn cache_tags(options: &QueryOptions) -> Vec<String> {
        std::iter::once(QUERY_CACHE_TAG.to_string())
            .chain(options.cache_tags.iter().cloned())
            .collect()
    }

    fn screen(&self, query: &str, params: &[Value], query_hash: &str) -> Result<(), QueryError> {
        self.validator.validate(query, params).inspect_err(|err| {
            warn!("Query {} rejected: {}", short_hash(query_hash), err);
            if let QueryError::Validation { rule } = err {
                self.events.emit(SecurityEvent {
                    event_type: "query_blocked".to_string(),
                    severity: Severity::High,
                    details: json!({ "query_hash": query_hash, "rule": rule }),
                });
            }
        })
    }

    // == Execute Query ==
    /// Runs `query` through validation, the cache and the engine.
    ///
    /// Cache failures never fail the call; they only cost a miss or a
    /// skipped write. Empty results are not cached.
    pub async fn execute_query(
        &self,
        query: &str,
        params: &[Value],
        options: &QueryOptions,
    ) -> Result<QueryResult, QueryError> {
        let query_hash = hash_query(query, params);
        self.screen(query, params, &query_hash)?;

        let cache_key = options
            .cache_key
            .clone()
            .unwrap_or_else(|| query_hash.clone());
        let cache_tags = Self::cache_tags(options);

        if options.enable_cache {
            if let Some(mut hit) = self.cache.get::<QueryResult>(&cache_key, &cache_tags).await {
                debug!("Query {} served from cache", short_hash(&query_hash));
                hit.cached = true;
                return Ok(hit);
            }
        }

        let timeout = options
            .timeout
            .unwrap_or(Duration::from_millis(self.config.default_timeout_ms));
        let (output, elapsed) = self
            .run_attempts(query, params, timeout, options.retries)
            .await
            .inspect_err(|err| self.report_failure(query, &query_hash, err))?;
        let execution_time = elapsed.as_secs_f64() * 1000.0;

        if execution_time > self.config.slow_query_threshold_ms as f64 {
            warn!(
                "Slow query {} took {:.1}ms",
                short_hash(&query_hash),
                execution_time
            );
        }

        let result = QueryResult {
            data: output.rows,
            execution_time,
            cached: false,
            affected_rows: output.affected_rows,
            query_plan: None,
        };

        if options.enable_cache && !result.data.is_empty() {
            let stored = self
                .cache
                .set(&cache_key, &result, options.cache_ttl, &cache_tags)
                .await;
            if !stored {
                debug!("Result of query {} not cached", short_hash(&query_hash));
            }
        }

        self.stats.record(&query_hash, execution_time);
        Ok(result)
    }

    // == Attempts ==
    /// Calls the engine up to `min(retries, max_retries) + 1` times, each
    /// attempt bounded by `timeout`, backing off between retryable failures.
    ///
    /// Returns the rows with the duration of the attempt that produced them;
    /// failed attempts and backoff sleeps are not included.
    async fn run_attempts(
        &self,
        query: &str,
        params: &[Value],
        timeout: Duration,
        retries: u32,
    ) -> Result<(EngineOutput, Duration), QueryError> {
        let max_attempts = retries.min(self.config.max_retries) + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started = Instant::now();
            let failure = match attempt_with_timeout(self.engine.as_ref(), query, params, timeout).await {
                Ok(output) => return Ok((output, started.elapsed())),
                Err(failure) => failure,
            };

            if let AttemptFailure::Engine(err) = &failure {
                if is_non_retryable(&err.message) {
                    return Err(QueryError::NonRetryable {
                        message: err.message.clone(),
                    });
                }
            }

            if attempt >= max_attempts {
                return Err(match failure {
                    AttemptFailure::TimedOut => QueryError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    },
                    AttemptFailure::Engine(err) => QueryError::Execution {
                        attempts: attempt,
                        message: err.message,
                    },
                });
            }

            let delay = backoff_delay(attempt - 1);
            warn!(
                "Query attempt {}/{} failed ({:?}), retrying in {}ms",
                attempt,
                max_attempts,
                failure,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Emits a security event when a failure looks injection-driven.
    fn report_failure(&self, query: &str, query_hash: &str, err: &QueryError) {
        let message = match err {
            QueryError::NonRetryable { message } | QueryError::Execution { message, .. } => message,
            _ => return,
        };
        if let Some(event) = self.validator.assess_failure(query, query_hash, message) {
            self.events.emit(event);
        }
    }

    // == Explain Query ==
    /// Returns the engine's plan for `query` without running it through the
    /// cache or the statistics. Failures are assessed like executions.
    pub async fn explain_query(&self, query: &str, params: &[Value]) -> Result<QueryResult, QueryError> {
        let query_hash = hash_query(query, params);
        self.screen(query, params, &query_hash)?;

        let timeout = Duration::from_millis(self.config.default_timeout_ms);
        let (plan, elapsed) = self
            .run_attempts(&format!("EXPLAIN {query}"), params, timeout, 0)
            .await
            .inspect_err(|err| self.report_failure(query, &query_hash, err))?;

        Ok(QueryResult {
            data: Vec::new(),
            execution_time: elapsed.as_secs_f64() * 1000.0,
            cached: false,
            affected_rows: None,
            query_plan: Some(plan.rows),
        })
    }

    // == Maintenance ==
    /// Renders and runs one maintenance template, bypassing the cache.
    pub async fn run_maintenance(&self, task: &MaintenanceTask) -> Result<QueryResult, QueryError> {
        let statement = task.render(&self.config.maintenance_tables)?;
        info!("Running maintenance task {}", task);
        self.execute_query(&statement, &[], &QueryOptions::uncached())
            .await
    }

    // == Statistics & Invalidation ==
    /// Tracked query statistics, most expensive first.
    pub fn query_stats(&self) -> Vec<(String, QueryStatEntry)> {
        self.stats.snapshot()
    }

    pub fn slowest_queries(&self, limit: usize) -> Vec<(String, QueryStatEntry)> {
        self.stats.slowest(limit)
    }

    pub fn clear_query_stats(&self) {
        self.stats.clear();
    }

    /// Drops cached entries carrying any of `tags`.
    pub async fn invalidate(&self, tags: &[String]) -> usize {
        self.cache.clear_by_tags(tags).await
    }

    /// Drops every cached query result.
    pub async fn invalidate_all_queries(&self) -> usize {
        self.cache
            .clear_by_tags(&[QUERY_CACHE_TAG.to_string()])
            .await
    }

    pub async fn health_check(&self) -> ExecutorHealth {
        ExecutorHealth {
            cache_backend: self.cache.ping().await,
            tracked_queries: self.stats.len(),
        }
    }
}
