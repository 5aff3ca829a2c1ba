//! API Routes
//!
//! Configures the Axum router with the operator endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, invalidate_handler, query_stats_handler, reset_stats_handler, stats_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Backend ping
/// - `GET /stats` - Cache statistics
/// - `POST /stats/reset` - Reset cache statistics
/// - `POST /invalidate` - Clear entries by tag
/// - `GET /query-stats` - Per-query timing statistics, mounted only when
///   the state carries a stats tracker
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let query_stats = state.query_stats.clone();
    let mut router: Router = Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/reset", post(reset_stats_handler))
        .route("/invalidate", post(invalidate_handler))
        .with_state(state);

    if let Some(tracker) = query_stats {
        router = router.merge(
            Router::new()
                .route("/query-stats", get(query_stats_handler))
                .with_state(tracker),
        );
    }

    router.layer(cors).layer(TraceLayer::new_for_http())
}
