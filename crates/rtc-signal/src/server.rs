//! HTTP and WebSocket surface of the signal relay
//!
//! HTTP handlers write into the mailbox and, for offers, try to push the
//! update to a connected peer. The push attempt never changes the HTTP
//! response: delivery is best-effort and polling is the fallback.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::{CorsConfig, SignalConfig};
use crate::error::{ChannelError, ServerError};
use crate::mailbox::Mailbox;
use crate::messages::{
    CheckResponse, ClientFrame, HealthResponse, IceCandidateRequest, PushMessage, SignalRequest,
    StatusResponse,
};
use crate::registry::{PushChannel, Registry};
use crate::sweeper::Sweeper;

/// Shared state handed to every handler
#[derive(Clone, Default)]
pub struct AppState {
    pub mailbox: Arc<Mailbox>,
    pub registry: Registry,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Signal relay server
#[derive(Clone)]
pub struct SignalServer {
    config: SignalConfig,
    state: AppState,
}

impl SignalServer {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            config,
            state: AppState::new(),
        }
    }

    /// Shared state (for monitoring and tests)
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes and middleware
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.config.cors)
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.serve_with_listener(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// The mailbox sweeper runs for exactly as long as the server does.
    pub async fn serve_with_listener<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Signal server listening on {}", listener.local_addr()?);

        let sweeper = Sweeper::new(
            self.state.mailbox.clone(),
            self.config.mailbox.sweep_interval(),
            self.config.mailbox.peer_ttl(),
        )
        .spawn();

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.shutdown().await;
        result.map_err(ServerError::from)
    }
}

/// Build the router over `state`
pub fn build_router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/offer", post(handle_offer))
        .route("/answer", post(handle_answer))
        .route("/ice-candidate", post(handle_ice_candidate))
        .route("/check/:peer_id", get(check_signals))
        .route("/ws/:client_id", get(ws_handler))
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Response headers exposed to credentialed cross-origin callers
const EXPOSED_HEADERS: [HeaderName; 3] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::DATE,
];

/// CORS policy from config
///
/// Browsers reject `*` on credentialed requests, so with credentials the
/// request's origin, method and headers are mirrored and the exposed headers
/// are listed explicitly.
pub fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let layer = if cfg.allows_any_origin() {
        if cfg.allow_credentials {
            CorsLayer::new().allow_origin(AllowOrigin::mirror_request())
        } else {
            CorsLayer::new().allow_origin(Any)
        }
    } else {
        let origins: Vec<HeaderValue> = cfg
            .allow_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    if cfg.allow_credentials {
        layer
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .expose_headers(EXPOSED_HEADERS)
    } else {
        layer
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
    }
}

async fn root() -> Json<StatusResponse> {
    Json(StatusResponse::new("WebRTC Signaling Server is running"))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        peers: state.mailbox.len(),
        connections: state.registry.len(),
    })
}

async fn handle_offer(
    State(state): State<AppState>,
    Json(req): Json<SignalRequest>,
) -> Json<StatusResponse> {
    info!(from = %req.from_peer, to = %req.to_peer, "Received offer");

    state.mailbox.set_offer(&req.to_peer, req.signal.clone());

    let push = PushMessage::Offer {
        from: req.from_peer,
        signal: req.signal,
    };
    if let Some(text) = encode(&push) {
        if !state.registry.send_if_present(&req.to_peer, text).await {
            debug!(to = %req.to_peer, "Offer not pushed; waiting for poll");
        }
    }

    Json(StatusResponse::new("Offer received"))
}

// Answers and candidates are only delivered through polling
async fn handle_answer(
    State(state): State<AppState>,
    Json(req): Json<SignalRequest>,
) -> Json<StatusResponse> {
    info!(from = %req.from_peer, to = %req.to_peer, "Received answer");
    state.mailbox.set_answer(&req.to_peer, req.signal);
    Json(StatusResponse::new("Answer received"))
}

async fn handle_ice_candidate(
    State(state): State<AppState>,
    Json(req): Json<IceCandidateRequest>,
) -> Json<StatusResponse> {
    info!(from = %req.from_peer, to = %req.to_peer, "Received ICE candidate");
    state.mailbox.append_candidate(&req.to_peer, req.candidate);
    Json(StatusResponse::new("ICE candidate received"))
}

/// Poll fallback for peers without a WebSocket
async fn check_signals(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Json<CheckResponse> {
    let response = CheckResponse::from_drained(state.mailbox.drain(&peer_id));
    if matches!(response, CheckResponse::NoPeer) {
        debug!(peer = %peer_id, "Check for unknown peer");
    }
    Json(response)
}

async fn ws_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    // The callback only runs once the handshake has completed
    ws.on_upgrade(move |socket| handle_socket(state, client_id, socket))
}

/// Outbound half of an upgraded WebSocket
pub struct WsChannel {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsChannel {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn send_text(&self, text: String) -> Result<(), ChannelError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }
}

/// Drive one push-channel session
async fn handle_socket(state: AppState, client_id: String, socket: WebSocket) {
    let (sink, mut stream) = socket.split();
    let channel = Arc::new(WsChannel::new(sink));

    // Deregisters on every way out of this function
    let _registration = state.registry.connect(&client_id, channel.clone());

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!(client = %client_id, "Client closed connection");
                break;
            }
            Ok(Message::Binary(data)) => {
                debug!(client = %client_id, "Ignoring binary frame ({} bytes)", data.len());
                continue;
            }
            // Protocol pings are answered by the websocket layer
            Ok(_) => continue,
            Err(e) => {
                warn!(client = %client_id, "WebSocket error: {}", e);
                break;
            }
        };

        match ClientFrame::parse(&text) {
            Ok(ClientFrame::Ping) => {
                let Some(pong) = encode(&PushMessage::Pong) else {
                    continue;
                };
                if let Err(e) = channel.send_text(pong).await {
                    warn!(client = %client_id, "Failed to send pong: {}", e);
                    break;
                }
            }
            Ok(ClientFrame::Other(message)) => {
                debug!(client = %client_id, "Message from client: {}", message);
            }
            Err(_) => {
                warn!(client = %client_id, "Invalid JSON: {}", text);
            }
        }
    }
}

fn encode(msg: &PushMessage) -> Option<String> {
    match msg.to_json() {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to encode push message: {}", e);
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
