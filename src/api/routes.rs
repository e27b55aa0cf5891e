//! API Routes
//!
//! Configures the Axum router with all content cache endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    claim_handler, gc_handler, get_content_handler, health_handler, list_stale_handler,
    mark_stale_handler, put_content_handler, render_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /content` - Store generated content
/// - `GET /content/:page_key/:locale` - Raw record lookup (`?version=N`)
/// - `POST /content/:page_key/:locale/:version/stale` - Force a record stale
/// - `POST /content/:page_key/:locale/claim` - Claim a record for regeneration
/// - `GET /stale` - Page through records due for regeneration
/// - `GET /render/:page_key/:locale` - Resolve copy for a page render
/// - `POST /gc` - Delete superseded versions
/// - `GET /stats` - Serving and regeneration counters
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/content", put(put_content_handler))
        .route("/content/:page_key/:locale", get(get_content_handler))
        .route("/content/:page_key/:locale/claim", post(claim_handler))
        .route(
            "/content/:page_key/:locale/:version/stale",
            post(mark_stale_handler),
        )
        .route("/stale", get(list_stale_handler))
        .route("/render/:page_key/:locale", get(render_handler))
        .route("/gc", post(gc_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
