use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::notification::model::{Notification, NotificationKind};
use crate::websocket::registry::{ConnectionRegistry, DeliveryError};

/// Message pushed to a connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePayload {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub from: Uuid,
    pub to: Uuid,
    pub content: String,
    pub content_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for LivePayload {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            kind: n.kind,
            from: n.actor,
            to: n.recipient,
            content: n.content.clone(),
            content_id: n.content_id,
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

/// Best-effort live push of stored notifications
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Push to the recipient if connected. Failures are logged, never returned:
    /// the notification is already persisted.
    pub fn deliver(&self, notification: &Notification) {
        let recipient = notification.recipient.to_string();
        match self
            .registry
            .send(&recipient, &LivePayload::from(notification))
        {
            Ok(()) => debug!(
                "Delivered {} notification to user {}",
                notification.kind, recipient
            ),
            Err(DeliveryError::NotConnected(_)) => {
                debug!("User {} not connected, skipping live delivery", recipient)
            }
            Err(e) => warn!("Live delivery to user {} failed: {}", recipient, e),
        }
    }
}
