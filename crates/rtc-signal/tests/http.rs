//! HTTP signaling and poll flow

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use rtc_signal::config::CorsConfig;
use rtc_signal::server::build_router;
use rtc_signal::AppState;

fn app() -> Router {
    build_router(AppState::new(), &CorsConfig::default())
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

async fn check(app: &Router, peer_id: &str) -> Value {
    let req = Request::get(format!("/check/{}", peer_id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_root_status() {
    let (status, body) = send(&app(), Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "WebRTC Signaling Server is running"}));
}

#[tokio::test]
async fn test_unknown_peer_is_no_peer() {
    assert_eq!(check(&app(), "0xdeadbeef").await, json!({"type": "no_peer"}));
}

#[tokio::test]
async fn test_full_handshake_via_polling() {
    let app = app();

    let (status, body) = post(
        &app,
        "/offer",
        json!({"from_peer": "alice", "to_peer": "bob", "signal": {"type": "offer", "sdp": "o"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "Offer received"}));

    let (_, body) = post(
        &app,
        "/answer",
        json!({"from_peer": "alice", "to_peer": "bob", "signal": {"type": "answer", "sdp": "a"}}),
    )
    .await;
    assert_eq!(body, json!({"status": "Answer received"}));

    for n in 1..=2 {
        let (_, body) = post(
            &app,
            "/ice-candidate",
            json!({"from_peer": "alice", "to_peer": "bob", "candidate": {"n": n}}),
        )
        .await;
        assert_eq!(body, json!({"status": "ICE candidate received"}));
    }

    let first = check(&app, "bob").await;
    assert_eq!(first["type"], "check");
    assert_eq!(first["offer"], json!({"type": "offer", "sdp": "o"}));
    assert_eq!(first["answer"], json!({"type": "answer", "sdp": "a"}));
    assert_eq!(first["has_candidates"], true);
    assert_eq!(first["candidates"], json!([{"n": 1}, {"n": 2}]));
    assert!(first["timestamp"].is_string());

    // Offer stays, answer and candidates were consumed
    let second = check(&app, "bob").await;
    assert_eq!(second["offer"], json!({"type": "offer", "sdp": "o"}));
    assert_eq!(second["answer"], Value::Null);
    assert_eq!(second["has_candidates"], false);
    assert_eq!(second["candidates"], json!([]));

    // Nothing was addressed to the sender
    assert_eq!(check(&app, "alice").await, json!({"type": "no_peer"}));
}

#[tokio::test]
async fn test_invalid_body_is_rejected() {
    let (status, _) = post(&app(), "/offer", json!({"from_peer": "a"})).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_cors_preflight() {
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/offer")
        .header(header::ORIGIN, "https://dapp.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let resp = app().oneshot(req).await.unwrap();
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://dapp.example"
    );
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(), "POST");
}
