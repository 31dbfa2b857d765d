//! WebSocket handler for the pairing protocol
//!
//! One endpoint serves both roles. Each inbound frame is handled as an
//! independent unit of work against the shared [`SessionStore`]; replies and
//! notifications go through per-connection outboxes so no socket write ever
//! happens while the store is locked.
//!
//! [`SessionStore`]: huepair_auth::SessionStore

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use huepair_auth::{ConnectionId, PairingError, SessionId};
use huepair_core::{ClientMessage, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Messages queued per connection before further sends are dropped
const OUTBOX_CAPACITY: usize = 64;

/// Largest text frame accepted from a client
const MAX_MESSAGE_BYTES: usize = 16 * 1024;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle one client connection until it closes
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection = ConnectionId::new();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOX_CAPACITY);

    info!("Client {} connected", connection);
    state.register_connection(connection, tx).await;

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to encode message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match ClientMessage::parse(&text) {
                Ok(message) => handle_client_message(&state, connection, message).await,
                Err(e) => {
                    warn!("Invalid message from {}: {} - raw: {}", connection, e, text);
                    state
                        .send_to(connection, ServerMessage::error("Invalid message"))
                        .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                state
                    .send_to(connection, ServerMessage::error("Binary messages are not supported"))
                    .await;
            }
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
            _ => {}
        }
    }

    disconnect(&state, connection).await;

    send_task.abort();
    info!("Client {} disconnected", connection);
}

/// Dispatch one decoded client message
pub async fn handle_client_message(
    state: &AppState,
    connection: ConnectionId,
    message: ClientMessage,
) {
    let now = Utc::now();

    match message {
        ClientMessage::CreateSession => {
            let session = state.store.open(connection, now).await;
            state
                .send_to(
                    connection,
                    ServerMessage::SessionCreated {
                        session_id: session.id.to_string(),
                        sequence: session.sequence,
                        challenge: session.challenge.value,
                        bucket: session.challenge.bucket,
                    },
                )
                .await;
        }

        ClientMessage::IdentifySession { sequence } => {
            let observed = match sequence.decode() {
                Ok(observed) => observed,
                Err(e) => {
                    debug!("Undecodable sequence from {}: {}", connection, e);
                    state.send_to(connection, ServerMessage::error(e.to_string())).await;
                    return;
                }
            };

            match state.store.identify(&observed, now).await {
                Ok(found) => {
                    state
                        .send_to(
                            connection,
                            ServerMessage::SessionFound {
                                session_id: found.session_id.to_string(),
                                challenge: found.challenge.value,
                                bucket: found.challenge.bucket,
                            },
                        )
                        .await;
                }
                Err(e) => reply_error(state, connection, e).await,
            }
        }

        ClientMessage::GetChallenge { session_id } => {
            match state
                .store
                .refresh_challenge(&SessionId::from(session_id), now)
                .await
            {
                Ok(challenge) => {
                    state
                        .send_to(
                            connection,
                            ServerMessage::Challenge {
                                challenge: challenge.value,
                                bucket: challenge.bucket,
                            },
                        )
                        .await;
                }
                Err(e) => reply_error(state, connection, e).await,
            }
        }

        ClientMessage::JoinSession {
            session_id,
            response,
            bucket,
        } => {
            let id = SessionId::from(session_id);
            match state
                .store
                .attach_scanner(&id, connection, &response, bucket, now)
                .await
            {
                Ok(initiator) => {
                    let joined = ServerMessage::ScannerConnected {
                        session_id: id.to_string(),
                    };
                    state.send_to(initiator, joined.clone()).await;
                    state.send_to(connection, joined).await;
                }
                Err(e) => reply_error(state, connection, e).await,
            }
        }

        ClientMessage::AuthHandshake {
            session_id,
            user,
            response,
            bucket,
        } => {
            let id = SessionId::from(session_id);
            match state
                .store
                .finalize(&id, connection, &response, bucket, now)
                .await
            {
                Ok(closed) => {
                    let success = ServerMessage::AuthSuccess { user };
                    state
                        .send_to(closed.session.initiator, success.clone())
                        .await;
                    state.send_to(connection, success).await;
                    info!("Auth successful for session {}", id);
                }
                Err(e) => reply_error(state, connection, e).await,
            }
        }
    }
}

/// Tear down everything a closed connection held
///
/// Sessions it initiated are abandoned and their scanners told. Sessions it
/// had joined as a scanner go back to open so a reconnecting scanner can
/// join again, and their initiators are told.
pub async fn disconnect(state: &AppState, connection: ConnectionId) {
    state.unregister_connection(connection).await;

    let closed = state.store.close_by_initiator(connection).await;
    state
        .notify_closed(&closed, "Session closed by initiator")
        .await;

    for (session_id, initiator) in state.store.detach_scanner(connection).await {
        state
            .send_to(
                initiator,
                ServerMessage::ScannerDisconnected {
                    session_id: session_id.to_string(),
                },
            )
            .await;
    }
}

async fn reply_error(state: &AppState, connection: ConnectionId, error: PairingError) {
    debug!("Request from {} failed: {}", connection, error);
    state
        .send_to(connection, ServerMessage::error(error.to_string()))
        .await;
}
