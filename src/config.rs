//! Configuration Module
//!
//! Handles loading configuration from environment variables and splitting it
//! into the settings each component consumes.

use std::env;
use std::str::FromStr;

// == Cache Config ==
/// Settings consumed by [`crate::cache::CacheStore`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default TTL in seconds for writes without an explicit TTL
    pub default_ttl: u64,
    /// Namespace prepended to every physical key
    pub key_prefix: String,
    /// Advisory; entries are currently stored uncompressed
    pub enable_compression: bool,
    /// Writes are refused once this many live entries are tracked
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: 300,
            key_prefix: "cache:".to_string(),
            enable_compression: false,
            max_size: 10_000,
        }
    }
}

// == Executor Config ==
/// Settings consumed by [`crate::query::QueryExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on per-call retries
    pub max_retries: u32,
    /// Per-attempt timeout when a call does not set one
    pub default_timeout_ms: u64,
    /// Executions slower than this are logged at warn level
    pub slow_query_threshold_ms: u64,
    /// Tables the maintenance templates may name
    pub maintenance_tables: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            default_timeout_ms: 30_000,
            slow_query_threshold_ms: 1_000,
            maintenance_tables: Vec::new(),
        }
    }
}

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub executor: ExecutorConfig,
    /// HTTP server port
    pub server_port: u16,
    /// Background maintenance interval in seconds
    pub cleanup_interval: u64,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_SIZE` - Maximum live cache entries (default: 10000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `KEY_PREFIX` - Cache namespace (default: `cache:`)
    /// - `ENABLE_COMPRESSION` - Advisory compression flag (default: false)
    /// - `MAX_RETRIES` - Retry cap per query (default: 3)
    /// - `QUERY_TIMEOUT_MS` - Default per-attempt timeout (default: 30000)
    /// - `SLOW_QUERY_MS` - Slow-query warning threshold (default: 1000)
    /// - `MAINTENANCE_TABLES` - Comma-separated allow-list (default: empty)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Maintenance frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache: CacheConfig {
                default_ttl: env_or("DEFAULT_TTL", defaults.cache.default_ttl),
                key_prefix: env_or("KEY_PREFIX", defaults.cache.key_prefix),
                enable_compression: env_or("ENABLE_COMPRESSION", defaults.cache.enable_compression),
                max_size: env_or("MAX_SIZE", defaults.cache.max_size),
            },
            executor: ExecutorConfig {
                max_retries: env_or("MAX_RETRIES", defaults.executor.max_retries),
                default_timeout_ms: env_or("QUERY_TIMEOUT_MS", defaults.executor.default_timeout_ms),
                slow_query_threshold_ms: env_or(
                    "SLOW_QUERY_MS",
                    defaults.executor.slow_query_threshold_ms,
                ),
                maintenance_tables: env::var("MAINTENANCE_TABLES")
                    .map(|v| parse_table_list(&v))
                    .unwrap_or_default(),
            },
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }
}

fn parse_table_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|table| !table.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            executor: ExecutorConfig::default(),
            server_port: 3000,
            cleanup_interval: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache.max_size, 10_000);
        assert_eq!(config.cache.default_ttl, 300);
        assert_eq!(config.cache.key_prefix, "cache:");
        assert!(!config.cache.enable_compression);
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.executor.default_timeout_ms, 30_000);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 60);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in ["MAX_SIZE", "DEFAULT_TTL", "MAX_RETRIES", "SERVER_PORT", "MAINTENANCE_TABLES"] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.cache.max_size, 10_000);
        assert_eq!(config.cache.default_ttl, 300);
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.server_port, 3000);
        assert!(config.executor.maintenance_tables.is_empty());
    }

    #[test]
    fn test_parse_table_list() {
        assert_eq!(
            parse_table_list(" users, jobs ,,audit_log"),
            vec!["users".to_string(), "jobs".to_string(), "audit_log".to_string()]
        );
        assert!(parse_table_list("").is_empty());
    }
}
