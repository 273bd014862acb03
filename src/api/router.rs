use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::endpoints::{catalog_handler, health_handler};
use crate::api::ws::ws_handler;
use crate::catalog::Catalog;
use crate::metrics::middleware::track_metrics;
use crate::protocol::SessionOptions;

/// State shared by every connection: the read-only catalog and the options
/// each new session starts with.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub session_options: SessionOptions,
}

// Creates the API router: the device WebSocket endpoint at `/`, the catalog listing and the health check.
pub fn api_router(catalog: Arc<Catalog>, session_options: SessionOptions) -> Router {
    let state = AppState {
        catalog,
        session_options,
    };

    Router::new()
        .route("/", get(ws_handler))
        .route("/catalog", get(catalog_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .route_layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
}
