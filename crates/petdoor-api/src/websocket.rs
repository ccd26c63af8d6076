//! WebSocket handler for real-time updates

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use petdoor_core::DoorEvent;
use petdoor_protocol::DoorStatus;
use serde::Serialize;

use crate::AppState;

/// WebSocket events sent to clients
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    Availability {
        entity_id: String,
        available: bool,
    },
    StatusChanged {
        entity_id: String,
        status: DoorStatus,
        open: bool,
    },
    SettingsChanged {
        entity_id: String,
    },
}

impl From<DoorEvent> for WsEvent {
    fn from(event: DoorEvent) -> Self {
        match event {
            DoorEvent::Availability {
                entity_id,
                available,
            } => WsEvent::Availability {
                entity_id,
                available,
            },
            DoorEvent::StatusChanged { entity_id, status } => WsEvent::StatusChanged {
                entity_id,
                status,
                open: status.is_open(),
            },
            DoorEvent::SettingsChanged { entity_id } => WsEvent::SettingsChanged { entity_id },
        }
    }
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Send connected message
    let Ok(connected_msg) = serde_json::to_string(&WsEvent::Connected) else {
        return;
    };
    if sender.send(Message::Text(connected_msg)).await.is_err() {
        return;
    }

    // Forward door events to the client
    let mut event_rx = state.hub.subscribe();
    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let ws_event = WsEvent::from(event);
                    let Ok(json) = serde_json::to_string(&ws_event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    // Skip missed messages
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    });

    // Handle incoming messages (for future use)
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(_text)) => {
                // Handle client commands here if needed
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Clean up
    send_task.abort();
}
