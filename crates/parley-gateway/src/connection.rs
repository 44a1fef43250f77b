use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info, trace, warn};
use uuid::Uuid;

use parley_types::events::ClientCommand;

use crate::handshake;
use crate::relay::Relay;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct GatewayState {
    pub relay: Relay,
    pub jwt_secret: Arc<str>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
}

/// `GET /ws`. The credential is checked before the upgrade so a failed
/// handshake never reaches the registry.
pub async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let claims = match handshake::authenticate(&headers, query.token.as_deref(), &state.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Rejected gateway handshake: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_connection(socket, state.relay, claims.sub))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// Drive one authenticated WebSocket until either side goes away, then
/// unregister it.
pub async fn handle_connection(socket: WebSocket, relay: Relay, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let (conn, mut outbound) = relay.connect(user_id);
    let connection_id = conn.connection_id;
    info!("{} connected to gateway ({})", user_id, connection_id);

    let shutdown = relay.shutdown_token();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbound.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode {}: {}", event.kind(), e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Read commands from client
    let relay_recv = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&relay_recv, user_id, cmd),
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    relay.disconnect(user_id, connection_id);
    info!("{} disconnected from gateway ({})", user_id, connection_id);
}

fn handle_command(relay: &Relay, user_id: Uuid, cmd: ClientCommand) {
    match cmd {
        ClientCommand::TypingStart { to_user_id } => {
            let delivered = relay.relay_typing(user_id, to_user_id, true);
            trace!("{} typing:start -> {} ({} conn)", user_id, to_user_id, delivered);
        }
        ClientCommand::TypingStop { to_user_id } => {
            let delivered = relay.relay_typing(user_id, to_user_id, false);
            trace!("{} typing:stop -> {} ({} conn)", user_id, to_user_id, delivered);
        }
    }
}
