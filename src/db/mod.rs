pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Row};
use tracing::{error, info};
use uuid::Uuid;

use crate::notification::model::{Notification, NotificationKind};

pub use memory::MemoryNotificationCollection;
pub use postgres::PgNotificationCollection;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal store error: {0}")]
    Internal(String),
}

/// Selects notification records
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationFilter {
    /// The dedup tuple. A `None` content id only matches other `None`s.
    DedupKey {
        actor: Uuid,
        recipient: Uuid,
        content_id: Option<Uuid>,
        kind: NotificationKind,
    },
    Recipient { recipient: Uuid, unread_only: bool },
    Id { id: Uuid, recipient: Uuid },
}

impl NotificationFilter {
    pub fn dedup_key(notification: &Notification) -> Self {
        NotificationFilter::DedupKey {
            actor: notification.actor,
            recipient: notification.recipient,
            content_id: notification.content_id,
            kind: notification.kind,
        }
    }

    pub fn matches(&self, record: &Notification) -> bool {
        match self {
            NotificationFilter::DedupKey {
                actor,
                recipient,
                content_id,
                kind,
            } => {
                record.actor == *actor
                    && record.recipient == *recipient
                    && record.content_id == *content_id
                    && record.kind == *kind
            }
            NotificationFilter::Recipient {
                recipient,
                unread_only,
            } => record.recipient == *recipient && (!unread_only || !record.is_read),
            NotificationFilter::Id { id, recipient } => {
                record.id == *id && record.recipient == *recipient
            }
        }
    }
}

/// Fields overwritten by `update_one`
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPatch {
    pub is_read: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl NotificationPatch {
    /// Re-surface a record with the read state and timestamp of `notification`
    pub fn refresh_from(notification: &Notification) -> Self {
        Self {
            is_read: notification.is_read,
            created_at: Some(notification.created_at),
        }
    }

    pub fn mark_read() -> Self {
        Self {
            is_read: true,
            created_at: None,
        }
    }

    /// Apply to a record, reporting whether anything changed
    pub fn apply(&self, record: &mut Notification) -> bool {
        let mut modified = false;
        if record.is_read != self.is_read {
            record.is_read = self.is_read;
            modified = true;
        }
        if let Some(created_at) = self.created_at {
            if record.created_at != created_at {
                record.created_at = created_at;
                modified = true;
            }
        }
        modified
    }
}

/// Results of `find` are always ordered newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: u64,
    pub limit: u64,
}

/// Document-style access to the notification collection
#[async_trait]
pub trait NotificationCollection: Send + Sync {
    async fn count(&self, filter: &NotificationFilter) -> Result<u64, StoreError>;

    async fn insert_one(&self, record: &Notification) -> Result<(), StoreError>;

    /// Update the first matching record. Returns the number of records whose
    /// fields actually changed, so re-applying identical values yields 0.
    async fn update_one(
        &self,
        filter: &NotificationFilter,
        patch: &NotificationPatch,
    ) -> Result<u64, StoreError>;

    async fn find(
        &self,
        filter: &NotificationFilter,
        options: FindOptions,
    ) -> Result<Vec<Notification>, StoreError>;
}

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Initialize the database schema
pub async fn init_db(pool: &PgPool) -> Result<(), sqlx::Error> {
    info!("Initializing database schema...");

    // Executing a bare &str uses the simple protocol, which allows multiple statements
    match pool.execute(SCHEMA_SQL).await {
        Ok(_) => {
            info!("Database schema initialized successfully");
            Ok(())
        }
        Err(e) => {
            error!("Failed to initialize database schema: {}", e);
            Err(e)
        }
    }
}

/// Check if the notifications table exists
pub async fn check_db_initialized(pool: &PgPool) -> bool {
    let result = sqlx::query(
        "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_schema = 'global' AND table_name = 'notifications')",
    )
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => row.try_get::<bool, _>(0).unwrap_or(false),
        Err(_) => false,
    }
}
