use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tokio::time;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::auth::jwt::validate_token;
use crate::notification::service::NotificationService;
use crate::websocket::registry::{ConnectionHandle, ConnectionRegistry};

/// Outgoing messages buffered per connection before writes start failing
pub const CONNECTION_BUFFER: usize = 100;

/// Query parameters for WebSocket connections
#[derive(Debug, Deserialize)]
pub struct WebSocketParams {
    token: Option<String>,
}

/// Shared state for the notification routes
pub struct NotificationState {
    pub registry: Arc<ConnectionRegistry>,
    pub service: Arc<NotificationService>,
    pub heartbeat: Duration,
}

fn error_frame(error_message: &str) -> String {
    serde_json::json!({ "error": error_message }).to_string()
}

/// Handle an invalid socket connection (authentication failure)
async fn handle_invalid_socket(mut socket: WebSocket, error_message: String) {
    if let Err(e) = socket
        .send(Message::Text(error_frame(&error_message)))
        .await
    {
        error!("Error sending error message on WS: {}", e);
    }

    let _ = socket.close().await;
}

/// Drive one authenticated connection until the client goes away
async fn handle_valid_connection(socket: WebSocket, user_id: Uuid, state: Arc<NotificationState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (handle, mut rx) = ConnectionHandle::channel(CONNECTION_BUFFER);
    let user_key = user_id.to_string();

    state.registry.add(user_key.clone(), handle.clone());
    info!("Connection added for user: {}", user_id);

    // Forward messages from channel to WebSocket
    let forward_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                error!("Error forwarding message to WebSocket: {}", e);
                break;
            }
        }
    });

    let heartbeat_handle = handle.clone();
    let heartbeat = state.heartbeat;
    let heartbeat_task = tokio::spawn(async move {
        let mut interval = time::interval(heartbeat);
        loop {
            interval.tick().await;
            if let Err(e) = heartbeat_handle.send_message(Message::Ping(vec![])).await {
                error!("Error sending heartbeat: {}", e);
                break;
            }
        }
    });

    // Incoming frames are only read to notice the client leaving
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                info!("WebSocket closed by client");
                break;
            }
            Ok(Message::Pong(_)) => {
                debug!("Received pong from user {}", user_id);
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    if !state.registry.remove_connection(&user_key, &handle) {
        debug!("Connection for user {} was already replaced", user_id);
    }
    forward_task.abort();
    heartbeat_task.abort();

    info!("WebSocket connection closed for user: {}", user_id);
}

/// Handle incoming WebSocket connection
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WebSocketParams>,
    State(state): State<Arc<NotificationState>>,
) -> impl IntoResponse {
    let token = params.token.unwrap_or_default();

    // Validate token and extract the user ID
    let user_id = match validate_token(&token) {
        Ok(claims) => match Uuid::parse_str(&claims.sub) {
            Ok(uuid) => uuid,
            Err(e) => {
                let error_message = format!("Invalid user ID in token: {}", e);
                return ws.on_upgrade(move |socket| async move {
                    handle_invalid_socket(socket, error_message).await;
                });
            }
        },
        Err(e) => {
            let error_message = format!("Invalid token: {}", e);
            return ws.on_upgrade(move |socket| async move {
                handle_invalid_socket(socket, error_message).await;
            });
        }
    };

    info!("User {} connected to notifications WebSocket", user_id);
    ws.on_upgrade(move |socket| async move {
        handle_valid_connection(socket, user_id, state).await;
    })
}
