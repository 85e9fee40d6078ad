//! HTTP integration tests.
//!
//! Starts the router on an ephemeral port and exercises it with reqwest.

#![cfg(feature = "http")]

use std::sync::Arc;

use serde_json::{json, Value};
use view_counter::blob::{BlobStore, InMemoryChannel};
use view_counter::http;
use view_counter::{visitor_id, AppState, CounterStore, ReferrerGate, RetryPolicy, Tracker};

const BLOG: &str = "https://blog.example.com";

fn state(channel: &InMemoryChannel, gate: ReferrerGate) -> Arc<AppState<InMemoryChannel>> {
    let counter =
        CounterStore::new(BlobStore::new(channel.clone())).with_retry(RetryPolicy::immediate(3));
    Arc::new(AppState::new(Tracker::new(counter), gate))
}

/// Bind to port 0 and return the base URL.
async fn start_server(state: Arc<AppState<InMemoryChannel>>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        http::serve(state, listener, std::future::pending()).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_check() {
    let base = start_server(state(&InMemoryChannel::new(), ReferrerGate::open())).await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn index_lists_endpoints() {
    let base = start_server(state(&InMemoryChannel::new(), ReferrerGate::open())).await;
    let body: Value = reqwest::get(format!("{base}/")).await.unwrap().json().await.unwrap();
    assert_eq!(body["name"], "view_counter");
    assert!(body["endpoints"]["trackView"].is_string());
}

#[tokio::test]
async fn track_view_counts_visitors() {
    let channel = InMemoryChannel::new();
    let base = start_server(state(&channel, ReferrerGate::open())).await;
    let client = reqwest::Client::new();

    let first: Value = client
        .get(format!("{base}/track-view?page=/about"))
        .header("x-forwarded-for", "1.2.3.4, 10.0.0.1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["success"], true);
    assert_eq!(first["isNewVisitor"], true);
    assert_eq!(first["totalViews"], 1);
    assert_eq!(first["totalUniqueVisitors"], 1);
    assert_eq!(first["visitorId"], visitor_id("1.2.3.4"));

    let second: Value = client
        .post(format!("{base}/track-view"))
        .header("x-forwarded-for", "1.2.3.4")
        .json(&json!({ "page": "/about" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["isNewVisitor"], false);
    assert_eq!(second["totalViews"], 2);

    let third: Value = client
        .post(format!("{base}/track-view"))
        .header("x-real-ip", "5.6.7.8")
        .body("not json at all")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(third["isNewVisitor"], true);
    assert_eq!(third["totalUniqueVisitors"], 2);

    assert_eq!(channel.artifacts("views.json").len(), 1);
}

#[tokio::test]
async fn peer_address_is_used_without_proxy_headers() {
    let channel = InMemoryChannel::new();
    let base = start_server(state(&channel, ReferrerGate::open())).await;

    let body: Value = reqwest::get(format!("{base}/track-view"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["visitorId"], visitor_id("127.0.0.1"));
    assert_ne!(body["visitorId"], "127.0.0.");
}

#[tokio::test]
async fn referrer_gate_rejects_other_sites() {
    let channel = InMemoryChannel::new();
    let base = start_server(state(&channel, ReferrerGate::new(Some(BLOG.into())))).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/track-view"))
        .header("referer", "https://elsewhere.test/page")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
    assert_eq!(channel.upload_count(), 0);

    let resp = client
        .get(format!("{base}/track-view"))
        .header("referer", format!("{BLOG}/posts/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{base}/track-view"))
        .header("origin", BLOG)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn stats_reports_aggregates() {
    let channel = InMemoryChannel::new();
    let base = start_server(state(&channel, ReferrerGate::open())).await;
    let client = reqwest::Client::new();

    for ip in ["1.2.3.4", "1.2.3.4", "5.6.7.8"] {
        let resp = client
            .get(format!("{base}/track-view"))
            .header("x-forwarded-for", ip)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let body: Value = client
        .get(format!("{base}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["totalViews"], 3);
    assert_eq!(body["totalUniqueVisitors"], 2);
    assert_eq!(body["recentVisitors"].as_array().unwrap().len(), 2);
    assert!(body.get("snapshot").is_none());

    let full: Value = client
        .get(format!("{base}/stats?full=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(full["snapshot"]["1.2.3.4"]["total_views"], 2);
    assert!(full["version"].is_string());
}

#[tokio::test]
async fn store_failure_is_a_server_error() {
    let channel = InMemoryChannel::new();
    let base = start_server(state(&channel, ReferrerGate::open())).await;

    channel.fail_next_lists(1);
    let resp = reqwest::get(format!("{base}/track-view")).await.unwrap();
    assert!(resp.status().is_server_error());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);

    channel.post(b"garbage", "views.json", "📊 **Views Updated**");
    let resp = reqwest::get(format!("{base}/stats")).await.unwrap();
    assert_eq!(resp.status(), 500);
}
