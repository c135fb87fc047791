use securescan::{build_app, config::Config, progress::ProgressBus, scan::ScanManager, AppState};
use securescan::storage::{MemoryScanStore, ScanStore};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing with RUST_LOG env filter (defaults to "info")
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config =
        Arc::new(Config::from_env().expect("Failed to load configuration from environment"));
    let port = config.listen_port;

    let store: Arc<dyn ScanStore> = Arc::new(MemoryScanStore::new());
    let bus = Arc::new(ProgressBus::new());
    let scans = Arc::new(ScanManager::new(config.clone(), store.clone(), bus.clone()));

    let state = AppState {
        config,
        store,
        bus,
        scans,
    };

    let app = build_app(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("Scanner service starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}
