use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::api::router::AppState;

#[derive(Serialize)]
pub struct CatalogEntry {
    firmware: String,
    board_version: String,
    version: String,
    size: u32,
}

// Handler for the catalog endpoint.
// Lists every firmware image the server can stream, ordered by firmware then board version.
pub async fn catalog_handler(State(app): State<AppState>) -> impl IntoResponse {
    let entries: Vec<CatalogEntry> = app
        .catalog
        .iter()
        .map(|image| CatalogEntry {
            firmware: image.name.clone(),
            board_version: image.board_version.clone(),
            version: image.version.clone(),
            size: image.size,
        })
        .collect();
    Json(entries)
}

// Handler for the health check endpoint.
// Returns a 200 OK status code if the server is healthy.
pub async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}
