use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{FindOptions, NotificationCollection, NotificationFilter, NotificationPatch, StoreError};
use crate::notification::model::Notification;

/// In-process notification collection, used for local runs and tests.
///
/// Every operation takes the same lock, so individual calls are atomic the way
/// single-document operations are in a real store.
#[derive(Debug, Default)]
pub struct MemoryNotificationCollection {
    records: Mutex<Vec<Notification>>,
    unavailable: AtomicBool,
}

impl MemoryNotificationCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, as if the backing store were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Copy of every stored record, in insertion order
    pub fn snapshot(&self) -> Vec<Notification> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, Vec<Notification>>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("store unavailable".to_string()));
        }
        self.records
            .lock()
            .map_err(|_| StoreError::Internal("notification store lock poisoned".to_string()))
    }
}

#[async_trait]
impl NotificationCollection for MemoryNotificationCollection {
    async fn count(&self, filter: &NotificationFilter) -> Result<u64, StoreError> {
        let records = self.records()?;
        Ok(records.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn insert_one(&self, record: &Notification) -> Result<(), StoreError> {
        let mut records = self.records()?;
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::Internal(format!(
                "duplicate notification id {}",
                record.id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn update_one(
        &self,
        filter: &NotificationFilter,
        patch: &NotificationPatch,
    ) -> Result<u64, StoreError> {
        let mut records = self.records()?;
        let target = records
            .iter_mut()
            .filter(|r| filter.matches(r))
            .max_by_key(|r| r.created_at);

        Ok(match target {
            Some(record) => u64::from(patch.apply(record)),
            None => 0,
        })
    }

    async fn find(
        &self,
        filter: &NotificationFilter,
        options: FindOptions,
    ) -> Result<Vec<Notification>, StoreError> {
        let records = self.records()?;
        let mut matching: Vec<Notification> =
            records.iter().filter(|r| filter.matches(r)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(matching
            .into_iter()
            .skip(options.skip as usize)
            .take(options.limit as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::model::NotificationKind;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_find_orders_newest_first_with_skip_and_limit() {
        let collection = MemoryNotificationCollection::new();
        let recipient = Uuid::new_v4();
        let base = Utc::now();

        for minutes in 0..5 {
            let n = Notification::new(Uuid::new_v4(), recipient, NotificationKind::Comment, None)
                .with_created_at(base + Duration::minutes(minutes));
            collection.insert_one(&n).await.unwrap();
        }

        let filter = NotificationFilter::Recipient {
            recipient,
            unread_only: false,
        };
        let page = collection
            .find(&filter, FindOptions { skip: 1, limit: 2 })
            .await
            .unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].created_at, base + Duration::minutes(3));
        assert_eq!(page[1].created_at, base + Duration::minutes(2));
    }

    #[tokio::test]
    async fn test_update_one_reports_zero_for_identical_values() {
        let collection = MemoryNotificationCollection::new();
        let n = Notification::new(Uuid::new_v4(), Uuid::new_v4(), NotificationKind::Reply, None);
        collection.insert_one(&n).await.unwrap();

        let filter = NotificationFilter::dedup_key(&n);
        let patch = NotificationPatch::refresh_from(&n);
        assert_eq!(collection.update_one(&filter, &patch).await.unwrap(), 0);

        let later = n.clone().with_created_at(n.created_at + Duration::seconds(5));
        let patch = NotificationPatch::refresh_from(&later);
        assert_eq!(collection.update_one(&filter, &patch).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_one_patches_newest_match_only() {
        let collection = MemoryNotificationCollection::new();
        let (actor, recipient) = (Uuid::new_v4(), Uuid::new_v4());
        let base = Utc::now();
        let older = Notification::new(actor, recipient, NotificationKind::Comment, None)
            .with_created_at(base - Duration::minutes(5));
        let newer = Notification::new(actor, recipient, NotificationKind::Comment, None)
            .with_created_at(base);
        collection.insert_one(&older).await.unwrap();
        collection.insert_one(&newer).await.unwrap();

        let filter = NotificationFilter::dedup_key(&older);
        let modified = collection
            .update_one(&filter, &NotificationPatch::mark_read())
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let records = collection.snapshot();
        let read: Vec<_> = records.iter().filter(|r| r.is_read).map(|r| r.id).collect();
        assert_eq!(read, vec![newer.id]);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let collection = MemoryNotificationCollection::new();
        collection.set_unavailable(true);

        let filter = NotificationFilter::Recipient {
            recipient: Uuid::new_v4(),
            unread_only: true,
        };
        assert!(matches!(
            collection.count(&filter).await,
            Err(StoreError::Internal(_))
        ));
    }
}
