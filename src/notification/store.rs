use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{FindOptions, NotificationCollection, NotificationFilter, NotificationPatch, StoreError};
use crate::notification::model::{parse_identifier, Notification, NotificationError, PAGE_SIZE};

/// Persistence and deduplication of notification records
#[derive(Clone)]
pub struct NotificationStore {
    collection: Arc<dyn NotificationCollection>,
}

impl NotificationStore {
    pub fn new(collection: Arc<dyn NotificationCollection>) -> Self {
        Self { collection }
    }

    /// Persist a notification, deduplicating on (actor, recipient, content_id, kind).
    ///
    /// Returns whether the recipient should see it as new: `true` for a fresh
    /// insert or a refreshed existing record, `false` when an existing like
    /// notification suppressed it or the refresh changed nothing. When `true`,
    /// `notification.id` is set to the id of the stored record.
    pub async fn send(&self, notification: &mut Notification) -> Result<bool, StoreError> {
        let filter = NotificationFilter::dedup_key(notification);

        let count = self.collection.count(&filter).await?;
        debug!(
            "Found {} existing {} notifications from {} to {}",
            count, notification.kind, notification.actor, notification.recipient
        );

        if count > 0 {
            // Like/unlike churn collapses into the first notification
            if notification.kind.is_like() {
                return Ok(false);
            }

            let modified = self
                .collection
                .update_one(&filter, &NotificationPatch::refresh_from(notification))
                .await?;
            if modified == 0 {
                return Ok(false);
            }

            let existing = self
                .collection
                .find(&filter, FindOptions { skip: 0, limit: 1 })
                .await?;
            if let Some(existing) = existing.first() {
                notification.id = existing.id;
            }
            return Ok(true);
        }

        notification.id = Uuid::new_v4();
        self.collection.insert_one(notification).await?;

        info!(
            "Stored {} notification {} for recipient {}",
            notification.kind, notification.id, notification.recipient
        );
        Ok(true)
    }

    /// One page of the recipient's notifications, newest first.
    ///
    /// Fetches `PAGE_SIZE + 1` records; the extra one only signals that a
    /// following page exists and is dropped by the view assembler.
    pub async fn list(
        &self,
        recipient_id: &str,
        page: i64,
    ) -> Result<Vec<Notification>, NotificationError> {
        let recipient = parse_identifier(recipient_id)?;
        let page = page.max(1);

        // Pages past the addressable range are simply empty
        let Some(skip) = (page - 1).checked_mul(PAGE_SIZE as i64) else {
            debug!("Page {} is out of range for recipient {}", page, recipient);
            return Ok(Vec::new());
        };

        let filter = NotificationFilter::Recipient {
            recipient,
            unread_only: false,
        };
        let options = FindOptions {
            skip: skip as u64,
            limit: PAGE_SIZE as u64 + 1,
        };

        Ok(self.collection.find(&filter, options).await?)
    }

    pub async fn unread_count(&self, recipient_id: &str) -> Result<u64, NotificationError> {
        let recipient = parse_identifier(recipient_id)?;
        let filter = NotificationFilter::Recipient {
            recipient,
            unread_only: true,
        };
        Ok(self.collection.count(&filter).await?)
    }

    /// Mark one of the recipient's notifications as read
    pub async fn mark_read(
        &self,
        recipient_id: &str,
        notification_id: &str,
    ) -> Result<(), NotificationError> {
        let recipient = parse_identifier(recipient_id)?;
        let id = parse_identifier(notification_id)?;
        let filter = NotificationFilter::Id { id, recipient };

        if self.collection.count(&filter).await? == 0 {
            return Err(NotificationError::NotFound);
        }

        // Already-read records report zero modifications, which is fine here
        self.collection
            .update_one(&filter, &NotificationPatch::mark_read())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryNotificationCollection;
    use crate::notification::model::NotificationKind;
    use chrono::{Duration, Utc};

    fn store() -> (Arc<MemoryNotificationCollection>, NotificationStore) {
        let collection = Arc::new(MemoryNotificationCollection::new());
        let store = NotificationStore::new(collection.clone());
        (collection, store)
    }

    #[tokio::test]
    async fn test_comment_dedup_refreshes_existing_record() {
        let (collection, store) = store();
        let (alice, bob, post) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let first_at = Utc::now() - Duration::minutes(10);

        let mut first = Notification::new(alice, bob, NotificationKind::Comment, Some(post))
            .with_created_at(first_at);
        assert!(store.send(&mut first).await.unwrap());

        // Bob reads it, then Alice comments again
        store
            .mark_read(&bob.to_string(), &collection.snapshot()[0].id.to_string())
            .await
            .unwrap();
        let second_at = Utc::now();
        let mut second = Notification::new(alice, bob, NotificationKind::Comment, Some(post))
            .with_created_at(second_at);
        assert!(store.send(&mut second).await.unwrap());

        let records = collection.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].created_at, second_at);
        assert!(!records[0].is_read);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_identical_resend_reports_unchanged() {
        let (collection, store) = store();
        let mut n = Notification::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NotificationKind::ConnectionRequest,
            None,
        );

        assert!(store.send(&mut n).await.unwrap());
        assert!(!store.send(&mut n).await.unwrap());
        assert_eq!(collection.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_like_is_suppressed_without_timestamp_bump() {
        let (collection, store) = store();
        let (alice, bob, post) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let first_at = Utc::now() - Duration::minutes(5);

        let mut first = Notification::new(alice, bob, NotificationKind::LikePost, Some(post))
            .with_created_at(first_at);
        assert!(store.send(&mut first).await.unwrap());

        let mut second = Notification::new(alice, bob, NotificationKind::LikePost, Some(post));
        assert!(!store.send(&mut second).await.unwrap());

        let records = collection.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].created_at, first_at);
    }

    #[tokio::test]
    async fn test_insert_assigns_fresh_id() {
        let (collection, store) = store();
        let mut n = Notification::new(Uuid::new_v4(), Uuid::new_v4(), NotificationKind::Reply, None);
        let caller_id = n.id;
        store.send(&mut n).await.unwrap();

        let records = collection.snapshot();
        assert_eq!(records.len(), 1);
        assert_ne!(records[0].id, caller_id);
        assert_eq!(records[0].id, n.id);
    }

    #[tokio::test]
    async fn test_store_error_is_returned() {
        let (collection, store) = store();
        collection.set_unavailable(true);

        let mut n = Notification::new(Uuid::new_v4(), Uuid::new_v4(), NotificationKind::Comment, None);
        assert!(store.send(&mut n).await.is_err());
    }

    #[tokio::test]
    async fn test_list_uses_lookahead_and_normalizes_page() {
        let (_collection, store) = store();
        let bob = Uuid::new_v4();
        let base = Utc::now();

        for i in 0..11 {
            let mut n = Notification::new(Uuid::new_v4(), bob, NotificationKind::Comment, None)
                .with_created_at(base - Duration::minutes(i));
            store.send(&mut n).await.unwrap();
        }

        let first = store.list(&bob.to_string(), 1).await.unwrap();
        assert_eq!(first.len(), PAGE_SIZE + 1);
        assert_eq!(first[0].created_at, base);

        let normalized = store.list(&bob.to_string(), -3).await.unwrap();
        assert_eq!(normalized, first);

        let second = store.list(&bob.to_string(), 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].created_at, base - Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_list_far_page_is_empty() {
        let (_collection, store) = store();
        let bob = Uuid::new_v4();
        let mut n = Notification::new(Uuid::new_v4(), bob, NotificationKind::Comment, None);
        store.send(&mut n).await.unwrap();

        for page in [i64::MAX, i64::MAX / PAGE_SIZE as i64 + 2, 1_000_000] {
            let result = store.list(&bob.to_string(), page).await.unwrap();
            assert!(result.is_empty(), "page {} should be empty", page);
        }
    }

    #[tokio::test]
    async fn test_list_rejects_invalid_identifier() {
        let (collection, store) = store();
        // Fails before touching the store
        collection.set_unavailable(true);

        let result = store.list("definitely-not-a-uuid", 1).await;
        assert!(matches!(result, Err(NotificationError::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_unread_count_and_mark_read() {
        let (collection, store) = store();
        let bob = Uuid::new_v4();
        for kind in [NotificationKind::Comment, NotificationKind::Reply] {
            store
                .send(&mut Notification::new(Uuid::new_v4(), bob, kind, None))
                .await
                .unwrap();
        }
        assert_eq!(store.unread_count(&bob.to_string()).await.unwrap(), 2);

        let id = collection.snapshot()[0].id;
        store.mark_read(&bob.to_string(), &id.to_string()).await.unwrap();
        assert_eq!(store.unread_count(&bob.to_string()).await.unwrap(), 1);

        // Marking another user's notification is not allowed
        let mallory = Uuid::new_v4();
        let result = store.mark_read(&mallory.to_string(), &id.to_string()).await;
        assert!(matches!(result, Err(NotificationError::NotFound)));
    }
}
