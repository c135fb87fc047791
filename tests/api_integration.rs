use axum::http::StatusCode;
use axum_test::TestServer;
use securescan::storage::{MemoryScanStore, ScanStore};
use securescan::{build_app, config::Config, progress::ProgressBus, scan::ScanManager, AppState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> Config {
    Config {
        listen_port: 0,
        worker_count: 2,
        rate_limit_delay: Duration::from_millis(1),
        max_concurrent_requests: 4,
        max_crawl_depth: 1,
        max_crawl_pages: 2,
        http_timeout: Duration::from_secs(2),
        http_max_body_bytes: 64 * 1024,
        user_agent: "SecureScan-Worker/1.0".to_string(),
    }
}

fn build_state() -> AppState {
    let config = Arc::new(test_config());
    let store: Arc<dyn ScanStore> = Arc::new(MemoryScanStore::new());
    let bus = Arc::new(ProgressBus::new());
    let scans = Arc::new(ScanManager::new(config.clone(), store.clone(), bus.clone()));
    AppState {
        config,
        store,
        bus,
        scans,
    }
}

#[tokio::test]
async fn test_create_scan_returns_pending_record() {
    let server = TestServer::new(build_app(build_state())).unwrap();

    // Scheme-less URLs are accepted and prefixed with https://.
    let response = server
        .post("/api/scans")
        .json(&json!({ "url": "test.invalid" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let record = response.json::<serde_json::Value>();
    assert_eq!(record["status"], "pending");
    assert_eq!(record["url"], "https://test.invalid");
    assert!(record["vulnerabilities"].as_array().unwrap().is_empty());
    assert_eq!(record["pagesScanned"], 0);
    let id = record["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let fetched = server.get(&format!("/api/scans/{id}")).await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<serde_json::Value>()["id"], id);
}

#[tokio::test]
async fn test_create_scan_rejects_bad_urls() {
    let server = TestServer::new(build_app(build_state())).unwrap();

    for bad in ["", "not a url at all", "ftp://example.com", "https://"] {
        let response = server.post("/api/scans").json(&json!({ "url": bad })).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_unknown_scan_is_404() {
    let server = TestServer::new(build_app(build_state())).unwrap();
    let response = server.get("/api/scans/does-not-exist").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_formats() {
    let state = build_state();
    let server = TestServer::new(build_app(state)).unwrap();

    let created = server
        .post("/api/scans")
        .json(&json!({ "url": "test.invalid" }))
        .await;
    let id = created.json::<serde_json::Value>()["id"]
        .as_str()
        .unwrap()
        .to_string();

    // The core serves the record shape for every supported format;
    // rendering is an external concern.
    for format in ["json", "pdf", "excel"] {
        let response = server
            .get(&format!("/api/scans/{id}/export?format={format}"))
            .await;
        response.assert_status_ok();
        let payload = response.json::<serde_json::Value>();
        assert_eq!(payload["format"], format);
        assert_eq!(payload["scan"]["id"], id);
    }

    let response = server
        .get(&format!("/api/scans/{id}/export?format=docx"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_scans_newest_first() {
    let server = TestServer::new(build_app(build_state())).unwrap();

    for url in ["first.invalid", "second.invalid"] {
        server
            .post("/api/scans")
            .json(&json!({ "url": url }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let listed = server.get("/api/scans").await;
    listed.assert_status_ok();
    let records = listed.json::<serde_json::Value>();
    assert_eq!(records.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unreachable_target_fails_with_synthetic_finding() {
    let state = build_state();
    let store = state.store.clone();
    let server = TestServer::new(build_app(state)).unwrap();

    // .invalid never resolves, so the seed fetch fails and the scan goes
    // to `failed` while staying addressable.
    let created = server
        .post("/api/scans")
        .json(&json!({ "url": "https://scanner-target.invalid" }))
        .await;
    let id = created.json::<serde_json::Value>()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let mut record = None;
    for _ in 0..400 {
        if let Some(current) = store.get(&id).await {
            if current.status.is_terminal() {
                record = Some(current);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let record = record.expect("scan did not reach a terminal state");

    assert_eq!(record.status, securescan::models::ScanStatus::Failed);
    assert_eq!(record.vulnerabilities.len(), 1);
    let finding = &record.vulnerabilities[0];
    assert_eq!(finding.description, "Unable to scan the target");
    assert_eq!(finding.severity, securescan::models::Severity::Low);
    assert_eq!(
        finding.category,
        securescan::models::Category::InformationDisclosure
    );
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::new(build_app(build_state())).unwrap();
    let response = server.get("/api/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["status"], "ok");
}
