//! Query Module
//!
//! Cache-aside query execution with security screening, timeouts, retries
//! and per-query statistics.

mod engine;
mod executor;
mod maintenance;
mod retry;
mod security;
mod stats;

pub use engine::{DataEngine, EngineError, EngineOutput};
pub use executor::{hash_query, ExecutorHealth, QueryExecutor, QueryOptions, QueryResult, QUERY_CACHE_TAG};
pub use maintenance::{MaintenanceTask, MAX_RECENT_ROWS};
pub use retry::{backoff_delay, is_non_retryable};
pub use security::{
    RuleKind, SecurityEvent, SecurityEventSink, SecurityRule, SecurityValidator, Severity,
    TracingSecurityEvents, MAX_INPUT_LENGTH,
};
pub use stats::{QueryStatEntry, StatsTracker, MAX_TRACKED_QUERIES};
