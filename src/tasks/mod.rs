//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Maintenance: purges expired backend keys and flushes cache statistics

mod maintenance;

pub use maintenance::spawn_maintenance_task;
