//! WebSocket endpoint
//!
//! One connection per player. The handshake validates the embedded-app
//! launch token from the query string before the client is registered; the
//! connection then splits into a read pump (inbound frames → engine) and a
//! write pump (hub buffer → socket, with keepalive pings). The supervisor
//! and the hub both hang off the shared router state, which is how the
//! broadcaster/engine reference cycle is avoided.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth;
use crate::config::Config;
use crate::game::runner::Engine;
use crate::net::hub::Hub;
use crate::net::protocol::parse_client_message;
use crate::room::room::PlayerId;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(|| async { StatusCode::OK }))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(rename = "initData", default)]
    init_data: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    if state.config.dev_mode() {
        // Development builds accept unsigned launch data from the mock env
        debug!("dev mode: skipping launch-token validation");
    } else if let Err(e) = auth::validate_init_data(&query.init_data, &state.config.bot_token) {
        warn!(err = %e, "launch token rejected");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let user_id = match auth::extract_user_id(&query.init_data) {
        Ok(id) => id,
        Err(e) => {
            warn!(err = %e, "bad launch data");
            return (StatusCode::BAD_REQUEST, "bad init data").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: PlayerId, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (mut outbox, generation) = state.hub.register(user_id);
    info!(player = user_id, "client connected");

    // Restore or eliminate a player who dropped mid-round
    state.engine.handle_connect(user_id);

    let ping_interval = state.config.ws_ping_interval;
    let write_pump = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + ping_interval,
            ping_interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                msg = outbox.recv() => {
                    let Some(msg) = msg else { break };
                    let text = match serde_json::to_string(&msg) {
                        Ok(t) => t,
                        Err(e) => {
                            warn!(err = %e, "outbound encode failed");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Read pump: runs on this task until the client goes away
    while let Some(frame) = stream.next().await {
        let Ok(frame) = frame else { break };
        match frame {
            Message::Text(text) => match parse_client_message(&text) {
                Ok(Some(msg)) => state.engine.handle_message(user_id, msg),
                Ok(None) => debug!(player = user_id, "ignoring unknown message type"),
                Err(e) => {
                    warn!(player = user_id, err = %e, "malformed frame, closing");
                    break;
                }
            },
            Message::Close(_) => break,
            // Pings are answered by axum; pongs need no action
            _ => {}
        }
    }

    let room_id = state.hub.unregister(user_id, generation);
    state.engine.handle_disconnect(user_id, room_id);
    write_pump.abort();
    info!(player = user_id, "client disconnected");
}
