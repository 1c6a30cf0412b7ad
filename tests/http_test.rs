//! HTTP front door tests against scripted backend links

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::{forwarder, ScriptedFactory, BACKEND_URL};
use mcp_cookie_relay::http_server::{create_router, AppState};
use mcp_cookie_relay::Config;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

fn router_for(factory: Arc<ScriptedFactory>) -> (Router, mcp_cookie_relay::RequestForwarder) {
    let forwarder = forwarder(factory);
    let state = Arc::new(AppState::new(forwarder.clone(), &Config::default()));
    (create_router(state), forwarder)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_cookie(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/tools/get-cookie")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_ping_reports_live_status() {
    let factory = ScriptedFactory::new();
    let (router, forwarder) = router_for(factory);

    let (status, body) = send(&router, get("/ping")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mcpServerUrl"], BACKEND_URL);
    assert_eq!(body["mcpClientReady"], false);
    assert_eq!(body["connectionStatus"]["isConnected"], false);
    assert_eq!(body["connectionStatus"]["maxReconnectAttempts"], 5);
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

    assert!(forwarder.supervisor().initialize().await);

    let (_, body) = send(&router, get("/ping")).await;
    assert_eq!(body["mcpClientReady"], true);
    assert_eq!(body["connectionStatus"]["isConnected"], true);
    assert_eq!(body["connectionStatus"]["reconnectAttempts"], 0);
}

#[tokio::test]
async fn test_tools_status_follows_connection() {
    let factory = ScriptedFactory::new();
    let (router, forwarder) = router_for(factory);

    let (status, body) = send(&router, get("/tools")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools"][0]["name"], "get-cookie");
    assert_eq!(body["tools"][0]["endpoint"], "/tools/get-cookie");
    assert_eq!(body["tools"][0]["status"], "initializing");

    forwarder.supervisor().initialize().await;

    let (_, body) = send(&router, get("/tools")).await;
    assert_eq!(body["tools"][0]["status"], "ready");
}

#[tokio::test]
async fn test_get_cookie_rejects_invalid_json() {
    let (router, _) = router_for(ScriptedFactory::new());

    let (status, body) = send(&router, post_cookie("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid JSON");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn test_get_cookie_requires_url() {
    let factory = ScriptedFactory::new();
    let (router, forwarder) = router_for(factory.clone());
    forwarder.supervisor().initialize().await;

    for payload in [r#"{}"#, r#"{"url": ""}"#, r#"{"url": 42}"#] {
        let (status, body) = send(&router, post_cookie(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {}", payload);
        assert_eq!(body, json!({"error": "Missing required parameter: url"}));
    }
    assert_eq!(factory.link(0).invokes(), 0);
}

#[tokio::test]
async fn test_get_cookie_when_not_ready() {
    let factory = ScriptedFactory::new();
    let (router, _) = router_for(factory.clone());

    let (status, body) = send(&router, post_cookie(r#"{"url": "https://example.com"}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "MCP client not ready");
    assert!(body["suggestion"].is_string());
    assert_eq!(body["connectionStatus"]["isConnected"], false);

    // A rejected request never triggers a connection attempt
    assert_eq!(factory.opens(), 0);
}

#[tokio::test]
async fn test_get_cookie_relays_tool_result() {
    let factory = ScriptedFactory::new();
    let (router, forwarder) = router_for(factory.clone());
    forwarder.supervisor().initialize().await;

    let (status, body) = send(&router, post_cookie(r#"{"url": "https://example.com"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Cookie retrieved successfully");
    assert_eq!(body["request"], json!({"url": "https://example.com"}));
    assert_eq!(
        body["response"]["content"][0]["text"],
        "get_cookie via link 1"
    );
    assert_eq!(body["response"]["echo"], json!({"url": "https://example.com"}));
    assert_eq!(factory.link(0).invokes(), 1);
}

#[tokio::test]
async fn test_get_cookie_recovers_from_dead_link() {
    let factory = ScriptedFactory::new();
    let (router, forwarder) = router_for(factory.clone());
    forwarder.supervisor().initialize().await;

    factory.link(0).kill();

    let (status, body) = send(&router, post_cookie(r#"{"url": "https://example.com"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["response"]["content"][0]["text"],
        "get_cookie via link 2"
    );
    assert_eq!(factory.link(0).invokes(), 1);
    assert_eq!(factory.link(1).invokes(), 1);
    assert!(factory.link(0).is_closed());
}

#[tokio::test]
async fn test_get_cookie_not_ready_when_reconnect_fails() {
    let factory = ScriptedFactory::new();
    let (router, forwarder) = router_for(factory.clone());
    forwarder.supervisor().initialize().await;

    factory.link(0).kill();
    factory.set_unreachable(true);

    let (status, body) = send(&router, post_cookie(r#"{"url": "https://example.com"}"#)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "MCP client not ready");
    assert!(body["suggestion"].as_str().unwrap().contains(BACKEND_URL));
    assert_eq!(body["connectionStatus"]["isConnected"], false);
    assert_eq!(factory.link(0).invokes(), 1);
    assert_eq!(factory.opens(), 2);
    assert!(!forwarder.supervisor().is_connected());
}

#[tokio::test]
async fn test_get_cookie_failed_retry_is_500() {
    let factory = ScriptedFactory::new();
    let (router, forwarder) = router_for(factory.clone());
    forwarder.supervisor().initialize().await;

    // Reconnect succeeds, but the replacement link times out on the retry
    factory.link(0).kill();
    factory.set_calls_time_out(true);

    let (status, body) = send(&router, post_cookie(r#"{"url": "https://example.com"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to communicate with MCP server");
    assert!(body["details"].as_str().unwrap().contains("timeout"));
    assert_eq!(factory.link(1).invokes(), 1);
    assert!(forwarder.supervisor().is_connected());
}

#[tokio::test]
async fn test_get_cookie_timeout_is_not_retried() {
    let factory = ScriptedFactory::new();
    let (router, forwarder) = router_for(factory.clone());
    forwarder.supervisor().initialize().await;

    factory.link(0).time_out_calls.store(true, Ordering::SeqCst);

    let (status, body) = send(&router, post_cookie(r#"{"url": "https://example.com"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["details"].as_str().unwrap().contains("timeout"));
    assert_eq!(factory.opens(), 1);
    assert!(forwarder.supervisor().is_connected());
}

#[tokio::test]
async fn test_preflight_and_cors_headers() {
    let (router, _) = router_for(ScriptedFactory::new());

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/tools/get-cookie")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
    for method in ["GET", "POST", "OPTIONS"] {
        assert!(methods.contains(method), "{} missing from {}", method, methods);
    }
    assert!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .eq_ignore_ascii_case("content-type"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());

    // OPTIONS without preflight headers, on a path with no route
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/anything")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let response = router.clone().oneshot(get("/ping")).await.unwrap();
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let (router, _) = router_for(ScriptedFactory::new());

    let (status, body) = send(&router, get("/cookies")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Not Found"}));

    // A known path with the wrong method is an unknown route too
    let (status, body) = send(&router, get("/tools/get-cookie")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Not Found"}));
}

#[tokio::test]
async fn test_reconnect_endpoint() {
    let factory = ScriptedFactory::new();
    factory.set_unreachable(true);
    let (router, forwarder) = router_for(factory.clone());

    let request = || {
        Request::builder()
            .method(Method::POST)
            .uri("/reconnect")
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = send(&router, request()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["connectionStatus"]["reconnectAttempts"], 0);

    factory.set_unreachable(false);
    let (status, body) = send(&router, request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["connectionStatus"]["isConnected"], true);
    assert!(forwarder.supervisor().is_connected());
}
