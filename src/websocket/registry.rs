use axum::extract::ws::Message;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("User {0} is not connected")]
    NotConnected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Sending side of one live WebSocket.
///
/// Messages go through a bounded channel to the connection's writer task, so a
/// write never waits on the network.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Message>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    /// Handle plus the receiver the writer task drains
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    pub fn write_message(&self, message: Message) -> Result<(), DeliveryError> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Transport("send buffer full".to_string()),
            TrySendError::Closed(_) => DeliveryError::Transport("connection closed".to_string()),
        })
    }

    /// Like `write_message`, but waits for buffer space instead of failing
    pub async fn send_message(&self, message: Message) -> Result<(), DeliveryError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| DeliveryError::Transport("connection closed".to_string()))
    }

    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Live connections keyed by user id, one per user.
///
/// A single lock covers the map. It is never held while writing to a
/// connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConnectionHandle>> {
        // The map stays consistent even if a holder panicked
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection, replacing any previous one for the user.
    /// The replaced handle is not closed.
    pub fn add(&self, user_id: impl Into<String>, connection: ConnectionHandle) {
        let user_id = user_id.into();
        let replaced = self.lock().insert(user_id.clone(), connection);
        if replaced.is_some() {
            debug!("Replaced existing connection for user {}", user_id);
        }
    }

    pub fn remove(&self, user_id: &str) {
        self.lock().remove(user_id);
    }

    /// Remove the user's entry only if it is still `connection`.
    ///
    /// Returns false when a newer connection has taken its place.
    pub fn remove_connection(&self, user_id: &str, connection: &ConnectionHandle) -> bool {
        let mut connections = self.lock();
        match connections.get(user_id) {
            Some(current) if current.same_connection(connection) => {
                connections.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.lock().contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Serialize `payload` as JSON and push it to the recipient's connection
    pub fn send<T: Serialize>(&self, recipient_id: &str, payload: &T) -> Result<(), DeliveryError> {
        let connection = self
            .lock()
            .get(recipient_id)
            .cloned()
            .ok_or_else(|| DeliveryError::NotConnected(recipient_id.to_string()))?;

        let text = serde_json::to_string(payload)?;
        connection.write_message(Message::Text(text))
    }
}
