//! API Module
//!
//! Operator endpoints for a running cache namespace.
//!
//! # Endpoints
//! - `GET /health` - Backend ping
//! - `GET /stats` - Cache statistics
//! - `POST /stats/reset` - Reset cache statistics
//! - `POST /invalidate` - Clear entries by tag
//! - `GET /query-stats` - Per-query timing statistics (with an executor attached)

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
