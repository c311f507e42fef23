//! Thin HTTP/WebSocket transport
//!
//! Exposes the read API over plain GET endpoints and the broadcaster over
//! a WebSocket upgrade. Routing only: security middleware, IP-level rate
//! limiting, and anything heavier belong to an outer layer.

use crate::broadcaster::{Broadcaster, WsInbound, WsOutbound, OUTBOUND_BUFFER};
use crate::query::{ReadApi, TokenFilters};
use axum::{
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokenpulse_core::{ApiError, ServerConfig};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Error body returned for failed requests
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn status_for(err: &ApiError) -> StatusCode {
    match err {
        ApiError::CacheUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
    }
}

#[derive(Clone)]
struct AppState {
    read_api: Arc<ReadApi>,
    broadcaster: Arc<Broadcaster>,
}

/// HTTP/WebSocket server over the read API and broadcaster
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, read_api: Arc<ReadApi>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            config,
            state: AppState {
                read_api,
                broadcaster,
            },
        }
    }

    fn build_router(&self) -> Router {
        Router::new()
            .route("/api/tokens", get(handle_list_tokens))
            .route("/api/tokens/{address}", get(handle_get_token))
            .route("/ws", get(handle_ws_upgrade))
            .route("/health", get(handle_health))
            .with_state(self.state.clone())
    }

    /// Serve until the shutdown channel fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(address = %addr, "api server listening");

        let router = self.build_router();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("api server shutting down");
            })
            .await
    }
}

async fn handle_list_tokens(
    State(state): State<AppState>,
    Query(filters): Query<TokenFilters>,
) -> Response {
    match state.read_api.get_all(&filters).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => {
            warn!(error = %e, "token listing failed");
            error_response(status_for(&e), e.to_string())
        }
    }
}

async fn handle_get_token(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Response {
    match state.read_api.get_by_address(&address).await {
        Ok(token) => Json(token).into_response(),
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}

async fn handle_health(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "healthy",
        "subscribers": state.broadcaster.subscriber_count().await,
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

async fn handle_ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster))
}

/// One subscriber connection: relay control messages in, pump events out
async fn handle_socket(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let id = Uuid::new_v4();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<WsOutbound>(OUTBOUND_BUFFER);
    broadcaster.on_connect(id, outbound_tx).await;

    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else { break };
                let payload = match serde_json::to_string(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(connection = %id, error = %e, "event serialization failed");
                        continue;
                    }
                };
                if write.send(Message::Text(Utf8Bytes::from(payload))).await.is_err() {
                    break;
                }
            }
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_control_message(&broadcaster, id, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(connection = %id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    broadcaster.on_disconnect(id).await;
}

async fn handle_control_message(broadcaster: &Broadcaster, id: Uuid, text: &str) {
    match serde_json::from_str::<WsInbound>(text) {
        Ok(WsInbound::SubscribeTokens { tokens }) => {
            broadcaster.subscribe(id, &tokens).await;
        }
        Ok(WsInbound::UnsubscribeTokens { tokens }) => {
            broadcaster.unsubscribe(id, &tokens).await;
        }
        Err(e) => {
            debug!(connection = %id, error = %e, "unrecognized control message");
        }
    }
}
