//! Change-feed socket: `GET /ws?room=CODE` streams committed writes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::AppState;
use crate::store::StoreEvent;
use crate::types::RoomCode;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub room: Option<String>,
    pub player: Option<String>,
}

/// Whether a subscriber filtered to `room` should see `event`.
/// Capacity changes are global and go to everyone.
pub fn event_visible(event: &StoreEvent, room: Option<&RoomCode>) -> bool {
    match (room, event.room_code()) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(filter), Some(code)) => filter == code,
    }
}

fn parse_room(room: Option<&str>) -> Result<Option<RoomCode>, String> {
    room.filter(|r| !r.trim().is_empty())
        .map(RoomCode::parse)
        .transpose()
        .map_err(|e| e.to_string())
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let room = match parse_room(params.room.as_deref()) {
        Ok(room) => room,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    tracing::info!(
        "Change feed connection request: room={:?}, player={:?}",
        room,
        params.player
    );

    ws.on_upgrade(move |socket| handle_socket(socket, room, state))
}

async fn send_message<S>(sender: &mut S, msg: &ServerMessage) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize feed message: {}", e);
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, mut room: Option<RoomCode>, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.store.subscribe();

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        room: room.clone(),
        server_now: state.store.now(),
    };
    if !send_message(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    loop {
        tokio::select! {
            event = feed.recv() => {
                let msg = match event {
                    Ok(event) if event_visible(&event, room.as_ref()) => ServerMessage::Event { event },
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Feed subscriber lagged by {} events", skipped);
                        ServerMessage::Resync { skipped }
                    }
                    Err(RecvError::Closed) => break,
                };
                if !send_message(&mut sender, &msg).await {
                    break;
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Ping) => ServerMessage::Pong {
                                server_now: state.store.now(),
                            },
                            Ok(ClientMessage::Subscribe { room: requested }) => {
                                match parse_room(requested.as_deref()) {
                                    Ok(parsed) => {
                                        tracing::debug!("Feed filter changed to {:?}", parsed);
                                        room = parsed;
                                        ServerMessage::Welcome {
                                            protocol: PROTOCOL_VERSION.to_string(),
                                            room: room.clone(),
                                            server_now: state.store.now(),
                                        }
                                    }
                                    Err(e) => ServerMessage::Error {
                                        code: "INVALID_ROOM".to_string(),
                                        msg: e,
                                    },
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                }
                            }
                        };
                        if !send_message(&mut sender, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Change feed closed by client");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!("Change feed connection closed (room={:?})", room);
}
