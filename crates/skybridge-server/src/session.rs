use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use tokio_util::sync::CancellationToken;

use skybridge_broker::Forwarder;
use skybridge_core::{ClientId, ClientMessage};

use crate::registry::{ConnectionRegistry, RegistryError};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Drive one WebSocket session: register the client, pump frames both
/// ways, and unregister exactly once on whatever exit path runs.
pub async fn handle_session(
    mut socket: WebSocket,
    client_id: ClientId,
    registry: Arc<ConnectionRegistry>,
    forwarder: Arc<Forwarder>,
    cancel: CancellationToken,
) {
    let mut rx = match registry.register(client_id.clone()) {
        Ok(rx) => rx,
        Err(RegistryError::Conflict(_)) => {
            tracing::warn!(client_id = %client_id, "Rejecting session: client id already connected");
            let _ = socket
                .send(WsMessage::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "client id already connected".into(),
                })))
                .await;
            return;
        }
    };
    tracing::info!(client_id = %client_id, "Session connected");

    let mut ping = tokio::time::interval(HEARTBEAT_INTERVAL);
    ping.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = socket
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "server shutting down".into(),
                    })))
                    .await;
                break;
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                match serde_json::to_string(&frame) {
                    Ok(text) => {
                        if socket.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(client_id = %client_id, error = %e, "Failed to serialize outbound frame");
                    }
                }
            }
            _ = ping.tick() => {
                if socket.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let message: ClientMessage = match serde_json::from_str(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::warn!(client_id = %client_id, error = %e, "Ignoring invalid client frame");
                                continue;
                            }
                        };
                        if let Err(e) = forwarder.forward(&message).await {
                            // Publish failures are the one error a session
                            // gets to see; close with the reason.
                            tracing::warn!(client_id = %client_id, error = %e, "Forward failed, closing session");
                            let _ = socket
                                .send(WsMessage::Close(Some(CloseFrame {
                                    code: close_code::ERROR,
                                    reason: "publish failed".into(),
                                })))
                                .await;
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // pings/pongs are handled by axum
                    Some(Err(e)) => {
                        tracing::debug!(client_id = %client_id, error = %e, "Socket error");
                        break;
                    }
                }
            }
        }
    }

    registry.unregister(&client_id);
    tracing::info!(client_id = %client_id, "Session disconnected");
}
