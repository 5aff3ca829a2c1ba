//! Request DTOs for the operator API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// Request body for POST /invalidate
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Entries carrying any of these tags are removed
    pub tags: Vec<String>,
}

impl InvalidateRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.tags.is_empty() {
            return Some("At least one tag is required".to_string());
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        None
    }
}

/// Query string for GET /query-stats
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryStatsParams {
    /// Maximum number of entries returned
    #[serde(default)]
    pub limit: Option<usize>,
}
