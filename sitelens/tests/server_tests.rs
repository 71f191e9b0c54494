use sitelens::router;
use sitelens_core::Analyzer;
use sitelens_core::config::RiskConfig;
use sitelens_scanner::error::Result as CaptureResult;
use sitelens_scanner::{
    CaptureError, ContextLease, LookupError, PageCapture, RawPageSnapshot, RawRegistryRecord,
    RegistryLookup, Renderer,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

struct PageRenderer;

impl Renderer for PageRenderer {
    async fn render(
        &self,
        url: &str,
        _timeout: Duration,
        _lease: ContextLease,
    ) -> CaptureResult<RawPageSnapshot> {
        if url.contains("unreachable") {
            return Err(CaptureError::navigation(url, "dns error"));
        }
        let mut snapshot = RawPageSnapshot::new(url);
        snapshot.html = r#"<div data-reactroot=""></div>"#.to_string();
        Ok(snapshot)
    }
}

struct DownRegistry;

impl RegistryLookup for DownRegistry {
    async fn lookup(&self, hostname: &str) -> Result<RawRegistryRecord, LookupError> {
        Err(LookupError::Empty(hostname.to_string()))
    }
}

async fn spawn_server() -> SocketAddr {
    let analyzer = Analyzer::new(
        PageCapture::new(PageRenderer),
        Some(DownRegistry),
        RiskConfig::default(),
    );
    let app = router(Arc::new(analyzer));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn post_analyze(addr: SocketAddr, body: Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(format!("http://{}/analyze", addr))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_health() {
    let addr = spawn_server().await;
    let body: Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_analyze_success_envelope() {
    let addr = spawn_server().await;
    let (status, body) = post_analyze(addr, json!({ "url": "example.com" })).await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert!(body["error"].is_null());
    assert_eq!(body["data"]["url"], "https://example.com/");
    assert_eq!(body["data"]["technology"]["frontend"][0]["name"], "React");
    assert_eq!(body["data"]["whois"]["error"], "WHOIS lookup failed");
}

#[tokio::test]
async fn test_missing_url_is_bad_request() {
    let addr = spawn_server().await;

    let (status, body) = post_analyze(addr, json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body, json!({ "success": false, "error": "URL is required", "data": null }));

    let (status, _) = post_analyze(addr, json!({ "url": "   " })).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let addr = spawn_server().await;
    let response = reqwest::Client::new()
        .post(format!("http://{}/analyze", addr))
        .header("content-type", "application/json")
        .body("{ nope")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "URL is required");
}

#[tokio::test]
async fn test_capture_failure_is_server_error() {
    let addr = spawn_server().await;
    let (status, body) = post_analyze(addr, json!({ "url": "https://unreachable.example/" })).await;

    assert_eq!(status, 500);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("dns error"));
    assert!(body["data"].is_null());
}
