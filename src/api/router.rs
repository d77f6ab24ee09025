use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Read-only status surface. Nothing here mutates the store.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render))
        // Wallets
        .route("/api/wallets", get(handlers::wallets::list))
        .route("/api/wallets/tracked", get(handlers::wallets::tracked))
        .route("/api/wallets/:address", get(handlers::wallets::detail))
        // Copy trades
        .route("/api/copy-trades", get(handlers::copy_trades::list))
        .route("/api/exposure", get(handlers::exposure::today))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
