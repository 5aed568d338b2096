use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::error;
use uuid::Uuid;

use super::{FindOptions, NotificationCollection, NotificationFilter, NotificationPatch, StoreError};
use crate::notification::model::{Notification, NotificationKind};

/// Notification collection backed by `global.notifications`
#[derive(Debug, Clone)]
pub struct PgNotificationCollection {
    pool: PgPool,
}

impl PgNotificationCollection {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &NotificationFilter) {
    match filter {
        NotificationFilter::DedupKey {
            actor,
            recipient,
            content_id,
            kind,
        } => {
            builder
                .push(" WHERE user_id = ")
                .push_bind(*actor)
                .push(" AND to_user_id = ")
                .push_bind(*recipient)
                .push(" AND kind = ")
                .push_bind(kind.as_str())
                .push(" AND content_id IS NOT DISTINCT FROM ")
                .push_bind(*content_id);
        }
        NotificationFilter::Recipient {
            recipient,
            unread_only,
        } => {
            builder.push(" WHERE to_user_id = ").push_bind(*recipient);
            if *unread_only {
                builder.push(" AND is_read = FALSE");
            }
        }
        NotificationFilter::Id { id, recipient } => {
            builder
                .push(" WHERE id = ")
                .push_bind(*id)
                .push(" AND to_user_id = ")
                .push_bind(*recipient);
        }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, to_user_id, kind, content, content_id, is_read, created_at FROM global.notifications";

fn count_query(filter: &NotificationFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM global.notifications");
    push_filter(&mut builder, filter);
    builder
}

/// Patch the newest matching row, touching it only if a value actually changes
fn update_query(
    filter: &NotificationFilter,
    patch: &NotificationPatch,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE global.notifications SET is_read = ");
    builder.push_bind(patch.is_read);
    if let Some(created_at) = patch.created_at {
        builder.push(", created_at = ").push_bind(created_at);
    }

    builder.push(" WHERE id = (SELECT id FROM global.notifications");
    push_filter(&mut builder, filter);
    builder.push(" ORDER BY created_at DESC LIMIT 1)");

    // Rows whose values already match are not counted as modified
    builder
        .push(" AND (is_read IS DISTINCT FROM ")
        .push_bind(patch.is_read);
    if let Some(created_at) = patch.created_at {
        builder
            .push(" OR created_at IS DISTINCT FROM ")
            .push_bind(created_at);
    }
    builder.push(")");
    builder
}

fn find_query(filter: &NotificationFilter, options: FindOptions) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SELECT_COLUMNS);
    push_filter(&mut builder, filter);
    builder
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(i64::try_from(options.limit).unwrap_or(i64::MAX))
        .push(" OFFSET ")
        .push_bind(i64::try_from(options.skip).unwrap_or(i64::MAX));
    builder
}

fn notification_from_row(row: &PgRow) -> Result<Notification, StoreError> {
    let kind: String = row.try_get("kind")?;
    let kind = kind.parse::<NotificationKind>().map_err(StoreError::Internal)?;

    Ok(Notification {
        id: row.try_get::<Uuid, _>("id")?,
        actor: row.try_get::<Uuid, _>("user_id")?,
        recipient: row.try_get::<Uuid, _>("to_user_id")?,
        kind,
        content: row.try_get("content")?,
        content_id: row.try_get::<Option<Uuid>, _>("content_id")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl NotificationCollection for PgNotificationCollection {
    async fn count(&self, filter: &NotificationFilter) -> Result<u64, StoreError> {
        let mut builder = count_query(filter);

        let count: i64 = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to count notifications: {}", e);
                StoreError::Database(e)
            })?
            .try_get(0)?;

        Ok(count.max(0) as u64)
    }

    async fn insert_one(&self, record: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO global.notifications (
                id, user_id, to_user_id, kind, content, content_id, is_read, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.actor)
        .bind(record.recipient)
        .bind(record.kind.as_str())
        .bind(&record.content)
        .bind(record.content_id)
        .bind(record.is_read)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert notification: {}", e);
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn update_one(
        &self,
        filter: &NotificationFilter,
        patch: &NotificationPatch,
    ) -> Result<u64, StoreError> {
        let mut builder = update_query(filter, patch);

        let result = builder.build().execute(&self.pool).await.map_err(|e| {
            error!("Failed to update notification: {}", e);
            StoreError::Database(e)
        })?;

        Ok(result.rows_affected())
    }

    async fn find(
        &self,
        filter: &NotificationFilter,
        options: FindOptions,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut builder = find_query(filter, options);

        let rows = builder.build().fetch_all(&self.pool).await.map_err(|e| {
            error!("Failed to fetch notifications: {}", e);
            StoreError::Database(e)
        })?;

        rows.iter().map(notification_from_row).collect()
    }
}
