//! Maintenance Templates
//!
//! The closed set of housekeeping statements periodic jobs may run. Each
//! argument is checked against an allow-list or bounds before it is
//! interpolated, so callers never assemble maintenance SQL by hand.

use std::fmt;

use crate::error::QueryError;

/// Largest row count `RecentRows` may request.
pub const MAX_RECENT_ROWS: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceTask {
    /// Refresh planner statistics for the whole database
    Analyze,
    /// Reclaim space held by one table
    Vacuum { table: String },
    /// Count rows in one table
    CountRows { table: String },
    /// Newest `limit` rows of one table, by `created_at`
    RecentRows { table: String, limit: u32 },
}

impl MaintenanceTask {
    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceTask::Analyze => "analyze",
            MaintenanceTask::Vacuum { .. } => "vacuum",
            MaintenanceTask::CountRows { .. } => "count_rows",
            MaintenanceTask::RecentRows { .. } => "recent_rows",
        }
    }

    // == Render ==
    /// Produces the statement text once every argument has been checked.
    pub fn render(&self, allowed_tables: &[String]) -> Result<String, QueryError> {
        match self {
            MaintenanceTask::Analyze => Ok("ANALYZE".to_string()),
            MaintenanceTask::Vacuum { table } => {
                Ok(format!("VACUUM {}", checked_table(table, allowed_tables)?))
            }
            MaintenanceTask::CountRows { table } => Ok(format!(
                "SELECT COUNT(*) AS count FROM {}",
                checked_table(table, allowed_tables)?
            )),
            MaintenanceTask::RecentRows { table, limit } => {
                let table = checked_table(table, allowed_tables)?;
                if !(1..=MAX_RECENT_ROWS).contains(limit) {
                    return Err(QueryError::InvalidTemplate(format!(
                        "limit {} outside 1..={}",
                        limit, MAX_RECENT_ROWS
                    )));
                }
                Ok(format!(
                    "SELECT * FROM {} ORDER BY created_at DESC LIMIT {}",
                    table, limit
                ))
            }
        }
    }
}

impl fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceTask::Analyze => write!(f, "analyze"),
            MaintenanceTask::Vacuum { table } | MaintenanceTask::CountRows { table } => {
                write!(f, "{}({})", self.name(), table)
            }
            MaintenanceTask::RecentRows { table, limit } => {
                write!(f, "{}({}, {})", self.name(), table, limit)
            }
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn checked_table<'a>(table: &'a str, allowed_tables: &[String]) -> Result<&'a str, QueryError> {
    if !is_identifier(table) || !allowed_tables.iter().any(|allowed| allowed == table) {
        return Err(QueryError::InvalidTemplate(format!(
            "table '{}' is not on the maintenance allow-list",
            table
        )));
    }
    Ok(table)
}
