mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use leafcheck::config::{BackendMode, Config, Credential};
use leafcheck::error::AnalysisError;
use leafcheck::pipeline::{AnalysisClient, build_backend};

/// Proxy stub that always answers `reply` and counts requests.
fn fixed_proxy(reply: Value, calls: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/analyze_leaf",
        post(move |Json(_req): Json<Value>| {
            let reply = reply.clone();
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Json(reply)
            }
        }),
    )
}

/// Proxy stub that decodes the uploaded PNG and reports its size.
fn measuring_proxy() -> Router {
    Router::new().route(
        "/analyze_leaf",
        post(|Json(req): Json<Value>| async move {
            let png = STANDARD.decode(req["image"].as_str().unwrap_or_default());
            match png.ok().and_then(|b| image::load_from_memory(&b).ok()) {
                Some(img) => Json(json!({ "analysis": format!("{}x{}", img.width(), img.height()) })),
                None => Json(json!({ "error": "image field is not a base64 PNG" })),
            }
        }),
    )
}

fn proxy_config(addr: std::net::SocketAddr) -> Config {
    let mut config = Config::default();
    config.backend.mode = BackendMode::Proxy;
    config.backend.proxy.url = format!("http://{addr}");
    config
}

fn direct_config(addr: std::net::SocketAddr) -> Config {
    let mut config = Config::default();
    config.backend.mode = BackendMode::Direct;
    config.backend.direct.endpoint = format!("http://{addr}/v1/messages");
    config
}

// ── proxy mode ───────────────────────────────────────────────────────

#[tokio::test]
async fn proxy_analysis_is_returned_verbatim() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = common::spawn(fixed_proxy(json!({"analysis": "X"}), calls.clone())).await;

    let client = AnalysisClient::from_config(&proxy_config(addr)).unwrap();
    let diagnosis = client.analyze(&common::leaf(8, 8)).await.unwrap();

    assert_eq!(diagnosis.text, "X");
    assert_eq!(diagnosis.backend, "Proxy");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn proxy_error_field_is_remote_reported() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = common::spawn(fixed_proxy(json!({"error": "Y"}), calls.clone())).await;

    let client = AnalysisClient::from_config(&proxy_config(addr)).unwrap();
    let err = client.analyze(&common::leaf(8, 8)).await.unwrap_err();

    assert!(matches!(err, AnalysisError::RemoteReported(ref m) if m == "Y"), "got {err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn proxy_unrelated_shape_is_response_shape() {
    let calls = Arc::new(AtomicUsize::new(0));
    let addr = common::spawn(fixed_proxy(json!({}), calls.clone())).await;

    let client = AnalysisClient::from_config(&proxy_config(addr)).unwrap();
    let err = client.analyze(&common::leaf(8, 8)).await.unwrap_err();

    assert!(matches!(err, AnalysisError::ResponseShape { .. }), "got {err:?}");
}

#[tokio::test]
async fn proxy_non_json_body_is_response_shape() {
    let app = Router::new().route("/analyze_leaf", post(|| async { "<html>hello</html>" }));
    let addr = common::spawn(app).await;

    let client = AnalysisClient::from_config(&proxy_config(addr)).unwrap();
    let err = client.analyze(&common::leaf(2, 2)).await.unwrap_err();

    assert_eq!(err.kind(), "response_shape");
}

#[tokio::test]
async fn proxy_receives_base64_png() {
    let addr = common::spawn(measuring_proxy()).await;
    let client = AnalysisClient::from_config(&proxy_config(addr)).unwrap();

    let diagnosis = client.analyze(&common::leaf(13, 7)).await.unwrap();
    assert_eq!(diagnosis.text, "13x7");
}

#[tokio::test]
async fn sequential_calls_are_independent() {
    let addr = common::spawn(measuring_proxy()).await;
    let client = AnalysisClient::from_config(&proxy_config(addr)).unwrap();

    let first = client.analyze(&common::leaf(3, 5)).await.unwrap();
    let second = client.analyze(&common::leaf(7, 2)).await.unwrap();

    assert_eq!(first.text, "3x5");
    assert_eq!(second.text, "7x2");
}

// ── transport failures ───────────────────────────────────────────────

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let addr = common::closed_port().await;
    let client = AnalysisClient::from_config(&proxy_config(addr)).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), client.analyze(&common::leaf(4, 4)))
        .await
        .expect("analysis should finish without retrying");

    let err = result.unwrap_err();
    assert!(matches!(err, AnalysisError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn server_error_status_is_transport_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/analyze_leaf",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
            }
        }),
    );
    let addr = common::spawn(app).await;

    let client = AnalysisClient::from_config(&proxy_config(addr)).unwrap();
    let err = client.analyze(&common::leaf(4, 4)).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Transport(_)), "got {err:?}");
    let message = err.to_string();
    assert!(message.contains("500"), "{message}");
    assert!(message.contains("upstream exploded"), "{message}");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "must not retry");
}

#[tokio::test]
async fn slow_server_times_out() {
    let app = Router::new().route(
        "/analyze_leaf",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({"analysis": "too late"}))
        }),
    );
    let addr = common::spawn(app).await;

    let mut config = proxy_config(addr);
    config.http.timeout_secs = 1;
    let client = AnalysisClient::from_config(&config).unwrap();

    let err = client.analyze(&common::leaf(4, 4)).await.unwrap_err();
    assert_eq!(err.kind(), "transport");
}

// ── direct mode ──────────────────────────────────────────────────────

#[tokio::test]
async fn direct_without_credential_makes_no_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/v1/messages",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Json(json!({"content": [{"type": "text", "text": "should not happen"}]}))
            }
        }),
    );
    let addr = common::spawn(app).await;

    let client = AnalysisClient::new(build_backend(&direct_config(addr), None).unwrap());
    let err = client.analyze(&common::leaf(4, 4)).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Configuration(_)), "got {err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn direct_sends_documented_request() {
    let captured: Arc<Mutex<Option<(HeaderMap, Value)>>> = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let app = Router::new().route(
        "/v1/messages",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some((headers, body));
                Json(json!({
                    "id": "msg_test",
                    "type": "message",
                    "role": "assistant",
                    "content": [{"type": "text", "text": "1. Species: Rosa"}]
                }))
            }
        }),
    );
    let addr = common::spawn(app).await;

    let backend = build_backend(&direct_config(addr), Credential::new("sk-test")).unwrap();
    let client = AnalysisClient::new(backend);
    let diagnosis = client.analyze(&common::leaf(6, 9)).await.unwrap();

    assert_eq!(diagnosis.text, "1. Species: Rosa");
    assert_eq!(diagnosis.backend, "Anthropic");

    let (headers, body) = captured.lock().unwrap().take().expect("request reached the stub");
    assert_eq!(headers["x-api-key"], "sk-test");
    assert_eq!(headers["anthropic-version"], "2023-06-01");
    assert_eq!(headers["content-type"], "application/json");

    assert_eq!(body["max_tokens"], 1000);
    assert_eq!(body["model"], Config::default().backend.direct.model);
    let content = &body["messages"][0]["content"];
    assert_eq!(content[0]["type"], "image");
    assert_eq!(content[0]["source"]["media_type"], "image/png");
    assert_eq!(content[1]["type"], "text");

    let png = STANDARD.decode(content[0]["source"]["data"].as_str().unwrap()).unwrap();
    let sent = image::load_from_memory(&png).unwrap();
    assert_eq!((sent.width(), sent.height()), (6, 9));
}

#[tokio::test]
async fn direct_missing_content_is_response_shape() {
    let app = Router::new().route(
        "/v1/messages",
        post(|| async { Json(json!({"id": "msg_test", "content": []})) }),
    );
    let addr = common::spawn(app).await;

    let backend = build_backend(&direct_config(addr), Credential::new("sk-test")).unwrap();
    let err = AnalysisClient::new(backend)
        .analyze(&common::leaf(2, 2))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "response_shape");
}

#[tokio::test]
async fn direct_vendor_error_status_is_transport_with_message() {
    let app = Router::new().route(
        "/v1/messages",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "type": "error",
                    "error": {"type": "authentication_error", "message": "invalid x-api-key"}
                })),
            )
        }),
    );
    let addr = common::spawn(app).await;

    let backend = build_backend(&direct_config(addr), Credential::new("sk-wrong")).unwrap();
    let err = AnalysisClient::new(backend)
        .analyze(&common::leaf(2, 2))
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Transport(_)), "got {err:?}");
    assert!(err.to_string().contains("invalid x-api-key"));
}
