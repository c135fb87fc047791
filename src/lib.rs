pub mod config;
pub mod crawler;
pub mod detectors;
pub mod models;
pub mod pool;
pub mod progress;
pub mod scan;
pub mod scanner;
pub mod server;
pub mod storage;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::progress::ProgressBus;
use crate::scan::ScanManager;
use crate::storage::ScanStore;

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ScanStore>,
    pub bus: Arc<ProgressBus>,
    pub scans: Arc<ScanManager>,
}

pub fn build_app(state: AppState) -> Router {
    // CORS stays permissive; the scanner API sits behind the front end.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/scans",
            post(server::routes::create_scan).get(server::routes::list_scans),
        )
        .route("/api/scans/{id}", get(server::routes::get_scan))
        .route("/api/scans/{id}/export", get(server::routes::export_scan))
        .route("/api/health", get(server::routes::health))
        .route("/ws", get(server::ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
