//! Query Cache - tagged TTL caching in front of a data engine
//!
//! Provides a namespaced cache store with tag invalidation and persisted
//! statistics, plus a query executor that validates, retries and caches
//! engine calls.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod tasks;

pub use api::{create_router, AppState};
pub use backend::{KvBackend, MemoryBackend};
pub use cache::{CacheStats, CacheStore, MsetItem};
pub use config::{CacheConfig, Config, ExecutorConfig};
pub use error::{CacheError, QueryError};
pub use query::{
    DataEngine, EngineError, EngineOutput, MaintenanceTask, QueryExecutor, QueryOptions,
    QueryResult, SecurityValidator, StatsTracker,
};
pub use tasks::spawn_maintenance_task;
