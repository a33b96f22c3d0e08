//! Push channel scenarios against a live server

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use rtc_signal::config::CorsConfig;
use rtc_signal::server::build_router;
use rtc_signal::{AppState, SignalConfig, SignalServer};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = SignalServer::new(SignalConfig::default());
        let state = server.state().clone();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve_with_listener(listener, async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            state,
            _shutdown: tx,
        }
    }

    async fn connect(&self, client_id: &str) -> Client {
        let url = format!("ws://{}/ws/{}", self.addr, client_id);
        let (ws, _) = connect_async(url).await.unwrap();
        ws
    }

    /// Post through a router sharing the live server's state
    async fn post(&self, uri: &str, body: Value) -> StatusCode {
        let app = build_router(self.state.clone(), &CorsConfig::default());
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

async fn next_json(ws: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for message")
        .expect("stream ended")
        .expect("websocket error");
    match msg {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {:?}", other),
    }
}

async fn ping(ws: &mut Client) -> Value {
    ws.send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    next_json(ws).await
}

#[tokio::test]
async fn test_ping_gets_pong() {
    let server = TestServer::start().await;
    let mut ws = server.connect("alice").await;

    assert_eq!(ping(&mut ws).await, json!({"type": "pong"}));
}

#[tokio::test]
async fn test_offer_is_pushed_over_websocket() {
    let server = TestServer::start().await;
    let mut ws = server.connect("B").await;
    wait_until(|| server.state.registry.is_connected("B")).await;

    let status = server
        .post(
            "/offer",
            json!({"from_peer": "A", "to_peer": "B", "signal": {"sdp": "v=0"}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "offer", "from": "A", "signal": {"sdp": "v=0"}})
    );
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let server = TestServer::start().await;
    let mut ws = server.connect("carol").await;

    ws.send(Message::Text("this is not json".into()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"type":"hello","x":1}"#.into()))
        .await
        .unwrap();

    // Neither frame gets a reply; the next one does
    assert_eq!(ping(&mut ws).await, json!({"type": "pong"}));
    assert!(server.state.registry.is_connected("carol"));
}

#[tokio::test]
async fn test_binary_frame_is_ignored() {
    let server = TestServer::start().await;
    let mut ws = server.connect("frank").await;

    ws.send(Message::Binary(vec![0xde, 0xad, 0xbe, 0xef]))
        .await
        .unwrap();

    // No reply to the binary frame; the session keeps serving text frames
    assert_eq!(ping(&mut ws).await, json!({"type": "pong"}));
    assert!(server.state.registry.is_connected("frank"));
}

#[tokio::test]
async fn test_close_deregisters() {
    let server = TestServer::start().await;
    let mut ws = server.connect("dave").await;
    wait_until(|| server.state.registry.is_connected("dave")).await;

    ws.close(None).await.unwrap();
    wait_until(|| !server.state.registry.is_connected("dave")).await;
}

#[tokio::test]
async fn test_abrupt_drop_deregisters() {
    let server = TestServer::start().await;
    let ws = server.connect("erin").await;
    wait_until(|| server.state.registry.is_connected("erin")).await;

    drop(ws);
    wait_until(|| !server.state.registry.is_connected("erin")).await;
}

#[tokio::test]
async fn test_reconnect_routes_to_newest_channel() {
    let server = TestServer::start().await;

    let mut first = server.connect("B").await;
    assert_eq!(ping(&mut first).await, json!({"type": "pong"}));

    let mut second = server.connect("B").await;
    // A pong proves the second session is registered and running
    assert_eq!(ping(&mut second).await, json!({"type": "pong"}));
    assert_eq!(server.state.registry.len(), 1);

    server
        .post(
            "/offer",
            json!({"from_peer": "A", "to_peer": "B", "signal": {"n": 2}}),
        )
        .await;
    assert_eq!(next_json(&mut second).await["signal"], json!({"n": 2}));
    assert!(
        tokio::time::timeout(Duration::from_millis(200), first.next())
            .await
            .is_err(),
        "stale channel must not receive pushes"
    );

    // Closing the stale session leaves the newer one registered
    first.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.state.registry.is_connected("B"));
}

#[tokio::test]
async fn test_offer_without_websocket_waits_for_poll() {
    let server = TestServer::start().await;

    let status = server
        .post(
            "/offer",
            json!({"from_peer": "A", "to_peer": "offline", "signal": {"sdp": "x"}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let drained = server.state.mailbox.drain("offline").unwrap();
    assert_eq!(drained.offer.map(Value::Object), Some(json!({"sdp": "x"})));
}
