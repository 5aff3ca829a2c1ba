//! Data Engine Contract
//!
//! The executor's only view of the database it fronts.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// == Engine Error ==
/// A failure reported by the data engine, carried as its human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// == Engine Output ==
/// Rows produced by one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub rows: Vec<Value>,
    /// Rows changed by a write statement, when the engine reports it
    pub affected_rows: Option<u64>,
}

impl From<Vec<Value>> for EngineOutput {
    fn from(rows: Vec<Value>) -> Self {
        Self {
            rows,
            affected_rows: None,
        }
    }
}

// == Data Engine Trait ==
/// Executes query text with bound parameters.
///
/// `cancel` is triggered when the caller stops waiting (timeout). Engines
/// that cannot abort in-flight work may ignore it; the executor never
/// relies on cancellation being honoured.
#[async_trait]
pub trait DataEngine: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        params: &[Value],
        cancel: CancellationToken,
    ) -> Result<EngineOutput, EngineError>;
}
