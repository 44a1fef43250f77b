use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use parley_types::events::{ClientCommand, ServerEvent};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// A live gateway connection: commands go in, events come out.
pub struct Transport {
    pub commands: mpsc::UnboundedSender<ClientCommand>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
    pump: JoinHandle<()>,
}

impl Transport {
    /// True once the socket has closed and the pump has exited.
    pub fn is_closed(&self) -> bool {
        self.pump.is_finished()
    }

    pub fn close(self) {
        self.pump.abort();
    }
}

/// Open the gateway socket, authenticating with the token as a query
/// parameter.
pub async fn connect(config: &ClientConfig) -> Result<Transport, ClientError> {
    let url = format!("{}?token={}", config.ws_url, config.token);
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    info!("Connected to {}", config.ws_url);

    let (mut ws_tx, mut ws_rx) = stream.split();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<ClientCommand>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let pump = tokio::spawn(async move {
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else { break };
                    let json = match serde_json::to_string(&command) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to encode command: {}", e);
                            continue;
                        }
                    };
                    if ws_tx.send(WsMessage::text(json)).await.is_err() {
                        break;
                    }
                }
                frame = ws_rx.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<ServerEvent>(text.as_str()) {
                                Ok(event) => {
                                    if event_tx.send(event).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => debug!("Ignoring unknown event: {}", e),
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Gateway read error: {}", e);
                            break;
                        }
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
        info!("Gateway connection closed");
    });

    Ok(Transport {
        commands: command_tx,
        events: event_rx,
        pump,
    })
}
