//! Attempt Policy
//!
//! Error classification, exponential backoff, and a timer that bounds a
//! single engine call and signals cancellation when it fires.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::query::engine::{DataEngine, EngineError, EngineOutput};

const BASE_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 5_000;

/// Message fragments (lowercase) of failures that retrying cannot fix.
const NON_RETRYABLE_PATTERNS: &[&str] = &[
    "syntax error",
    "duplicate key",
    "unique constraint",
    "foreign key constraint",
    "not null constraint",
    "check constraint",
    "constraint failed",
    "violates",
    "permission denied",
    "access denied",
    "division by zero",
    "divide by zero",
];

/// True if `message` names a failure class that will not go away on retry.
pub fn is_non_retryable(message: &str) -> bool {
    let message = message.to_lowercase();
    NON_RETRYABLE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

/// Delay before retry number `attempt + 1`: `min(100ms * 2^attempt, 5s)`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

// == Timed Attempt ==
/// Why a single attempt did not produce rows.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AttemptFailure {
    TimedOut,
    Engine(EngineError),
}

/// Runs one engine call bounded by `timeout`.
///
/// When the timer wins, the call's future is dropped and its cancellation
/// token is triggered. Work the engine already handed elsewhere may still
/// complete after this returns.
pub(crate) async fn attempt_with_timeout(
    engine: &dyn DataEngine,
    query: &str,
    params: &[Value],
    timeout: Duration,
) -> Result<EngineOutput, AttemptFailure> {
    let cancel = CancellationToken::new();
    let call = engine.execute(query, params, cancel.clone());
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(AttemptFailure::Engine),
        Err(_) => {
            cancel.cancel();
            Err(AttemptFailure::TimedOut)
        }
    }
}
