use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::cache::UnreadCountCache;
use crate::db::NotificationCollection;
use crate::identity::IdentityLookup;
use crate::notification::model::{
    parse_identifier, Notification, NotificationError, NotificationPage,
};
use crate::notification::store::NotificationStore;
use crate::notification::view::ViewAssembler;
use crate::websocket::dispatcher::Dispatcher;

/// Entry point for producing and reading notifications
#[derive(Clone)]
pub struct NotificationService {
    store: NotificationStore,
    assembler: ViewAssembler,
    dispatcher: Dispatcher,
    unread_cache: Option<Arc<dyn UnreadCountCache>>,
}

impl NotificationService {
    pub fn new(
        collection: Arc<dyn NotificationCollection>,
        identities: Arc<dyn IdentityLookup>,
        dispatcher: Dispatcher,
        unread_cache: Option<Arc<dyn UnreadCountCache>>,
    ) -> Self {
        Self {
            store: NotificationStore::new(collection),
            assembler: ViewAssembler::new(identities),
            dispatcher,
            unread_cache,
        }
    }

    /// Persist a notification and push it live when it is new or changed.
    ///
    /// Only persistence errors are returned; live delivery is best effort.
    pub async fn notify(&self, mut notification: Notification) -> Result<(), NotificationError> {
        let is_new = self.store.send(&mut notification).await?;
        if !is_new {
            debug!(
                "Notification {} from {} to {} unchanged, not delivering",
                notification.kind, notification.actor, notification.recipient
            );
            return Ok(());
        }

        self.invalidate_unread_count(&notification.recipient).await;
        self.dispatcher.deliver(&notification);
        Ok(())
    }

    /// Fire-and-forget `notify` for request handlers.
    ///
    /// Users are never notified about their own actions.
    pub fn notify_detached(&self, notification: Notification) {
        if notification.actor == notification.recipient {
            debug!(
                "Skipping {} notification to self for user {}",
                notification.kind, notification.actor
            );
            return;
        }

        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.notify(notification).await {
                error!("Failed to send notification: {:?}", e);
            }
        });
    }

    /// Raw page from the store, including the lookahead row
    pub async fn list_raw(
        &self,
        user_id: &str,
        page: i64,
    ) -> Result<Vec<Notification>, NotificationError> {
        self.store.list(user_id, page).await
    }

    /// One page of joined notifications with pagination and unread metadata
    pub async fn list_for_user(
        &self,
        user_id: &str,
        page: i64,
    ) -> Result<NotificationPage, NotificationError> {
        let page = page.max(1);
        let raw = self.list_raw(user_id, page).await?;
        let (notifications, next) = self.assembler.assemble(raw).await?;
        let unread_count = self.unread_count(user_id).await?;

        Ok(NotificationPage {
            notifications,
            next,
            page,
            unread_count,
        })
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<u64, NotificationError> {
        let recipient = parse_identifier(user_id)?;

        let Some(cache) = &self.unread_cache else {
            return self.store.unread_count(user_id).await;
        };

        match cache.get_unread_count(&recipient).await {
            Ok(Some(count)) => return Ok(count),
            Ok(None) => {}
            Err(e) => warn!("Failed to read cached unread count: {}", e),
        }

        // Read before counting, so an invalidation during the count is detected
        let generation = match cache.unread_count_generation(&recipient).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!("Failed to read unread count generation: {}", e);
                None
            }
        };

        let count = self.store.unread_count(user_id).await?;

        if let Some(generation) = generation {
            match cache.set_unread_count(&recipient, count, generation).await {
                Ok(true) => {}
                Ok(false) => debug!(
                    "Unread count for {} changed while counting, not caching",
                    recipient
                ),
                Err(e) => warn!("Failed to cache unread count: {}", e),
            }
        }

        Ok(count)
    }

    pub async fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> Result<(), NotificationError> {
        self.store.mark_read(user_id, notification_id).await?;
        let recipient = parse_identifier(user_id)?;
        self.invalidate_unread_count(&recipient).await;
        Ok(())
    }

    async fn invalidate_unread_count(&self, user_id: &Uuid) {
        if let Some(cache) = &self.unread_cache {
            if let Err(e) = cache.invalidate_unread_count(user_id).await {
                warn!("Failed to invalidate unread count for {}: {}", user_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryUnreadCountCache;
    use crate::db::{
        FindOptions, MemoryNotificationCollection, NotificationFilter, NotificationPatch,
        StoreError,
    };
    use crate::identity::{MemoryIdentityLookup, UserView};
    use crate::notification::model::{NotificationKind, PAGE_SIZE};
    use crate::websocket::dispatcher::LivePayload;
    use crate::websocket::registry::{ConnectionHandle, ConnectionRegistry};
    use axum::extract::ws::Message;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Fixture {
        collection: Arc<MemoryNotificationCollection>,
        identities: Arc<MemoryIdentityLookup>,
        registry: Arc<ConnectionRegistry>,
        service: NotificationService,
    }

    fn fixture() -> Fixture {
        let collection = Arc::new(MemoryNotificationCollection::new());
        let identities = Arc::new(MemoryIdentityLookup::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let service = NotificationService::new(
            collection.clone(),
            identities.clone(),
            Dispatcher::new(registry.clone()),
            None,
        );
        Fixture {
            collection,
            identities,
            registry,
            service,
        }
    }

    /// Lands one more unread notification right after an unread count is
    /// taken, the way a concurrent `notify` would
    struct RacingCollection {
        inner: MemoryNotificationCollection,
        cache: Arc<MemoryUnreadCountCache>,
        late: Mutex<Option<Notification>>,
    }

    #[async_trait]
    impl NotificationCollection for RacingCollection {
        async fn count(&self, filter: &NotificationFilter) -> Result<u64, StoreError> {
            let count = self.inner.count(filter).await?;
            if let NotificationFilter::Recipient {
                unread_only: true, ..
            } = filter
            {
                let late = self.late.lock().unwrap().take();
                if let Some(late) = late {
                    self.inner.insert_one(&late).await?;
                    self.cache
                        .invalidate_unread_count(&late.recipient)
                        .await
                        .unwrap();
                }
            }
            Ok(count)
        }

        async fn insert_one(&self, record: &Notification) -> Result<(), StoreError> {
            self.inner.insert_one(record).await
        }

        async fn update_one(
            &self,
            filter: &NotificationFilter,
            patch: &NotificationPatch,
        ) -> Result<u64, StoreError> {
            self.inner.update_one(filter, patch).await
        }

        async fn find(
            &self,
            filter: &NotificationFilter,
            options: FindOptions,
        ) -> Result<Vec<Notification>, StoreError> {
            self.inner.find(filter, options).await
        }
    }

    fn user(name: &str) -> UserView {
        UserView {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@example.edu", name.to_lowercase()),
            school: "Science".to_string(),
            department: "Physics".to_string(),
            follow_count: 0,
            academic_year: 3,
            profile_image_url: String::new(),
            is_teacher: false,
            blue_badge: false,
            is_complete: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn connect(registry: &ConnectionRegistry, user_id: Uuid) -> mpsc::Receiver<Message> {
        let (handle, rx) = ConnectionHandle::channel(16);
        registry.add(user_id.to_string(), handle);
        rx
    }

    fn payload(message: Message) -> LivePayload {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("Expected text message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_comment_is_delivered_twice_but_stored_once() {
        let f = fixture();
        let (alice, bob, post) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut rx = connect(&f.registry, bob);

        let first = Notification::new(alice, bob, NotificationKind::Comment, Some(post))
            .with_created_at(Utc::now() - Duration::minutes(1));
        let second = Notification::new(alice, bob, NotificationKind::Comment, Some(post));
        f.service.notify(first).await.unwrap();
        f.service.notify(second.clone()).await.unwrap();

        let original = payload(rx.recv().await.unwrap());
        let latest = payload(rx.recv().await.unwrap());
        assert_eq!(latest.created_at, second.created_at);

        let stored = f.collection.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(original.id, stored[0].id);
        assert_eq!(latest.id, stored[0].id);
        assert_eq!(stored[0].created_at, second.created_at);
        assert_eq!(stored[0].is_read, second.is_read);
    }

    #[tokio::test]
    async fn test_repeated_like_is_not_delivered_again() {
        let f = fixture();
        let (alice, bob, post) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut rx = connect(&f.registry, bob);

        let first_at = Utc::now() - Duration::minutes(1);
        let first = Notification::new(alice, bob, NotificationKind::LikePost, Some(post))
            .with_created_at(first_at);
        f.service.notify(first).await.unwrap();
        f.service
            .notify(Notification::new(alice, bob, NotificationKind::LikePost, Some(post)))
            .await
            .unwrap();

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());

        let stored = f.collection.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].created_at, first_at);
    }

    #[tokio::test]
    async fn test_store_failure_skips_delivery() {
        let f = fixture();
        let bob = Uuid::new_v4();
        let mut rx = connect(&f.registry, bob);
        f.collection.set_unavailable(true);

        let result = f
            .service
            .notify(Notification::new(Uuid::new_v4(), bob, NotificationKind::Reply, None))
            .await;

        assert!(matches!(result, Err(NotificationError::Store(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_offline_recipient_still_persists() {
        let f = fixture();
        let bob = Uuid::new_v4();

        f.service
            .notify(Notification::new(
                Uuid::new_v4(),
                bob,
                NotificationKind::ConnectionRequest,
                None,
            ))
            .await
            .unwrap();

        assert_eq!(f.collection.snapshot().len(), 1);
        assert_eq!(f.service.unread_count(&bob.to_string()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pagination_with_eleven_notifications() {
        let f = fixture();
        let bob = user("Bob");
        f.identities.insert(bob.clone());

        let base = Utc::now();
        for i in 0..11 {
            let actor = user(&format!("Actor{}", i));
            f.identities.insert(actor.clone());
            let n = Notification::new(actor.id, bob.id, NotificationKind::Comment, None)
                .with_created_at(base - Duration::minutes(i));
            f.service.notify(n).await.unwrap();
        }

        let page1 = f.service.list_for_user(&bob.id.to_string(), 1).await.unwrap();
        assert_eq!(page1.notifications.len(), PAGE_SIZE);
        assert!(page1.next);
        assert_eq!(page1.page, 1);
        assert_eq!(page1.unread_count, 11);
        assert!(page1
            .notifications
            .windows(2)
            .all(|w| w[0].created_at >= w[1].created_at));

        let page2 = f.service.list_for_user(&bob.id.to_string(), 2).await.unwrap();
        assert_eq!(page2.notifications.len(), 1);
        assert!(!page2.next);
        assert_eq!(page2.notifications[0].created_at, base - Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_listing_huge_page_number_is_empty() {
        let f = fixture();
        let bob = user("Bob");
        f.identities.insert(bob.clone());

        let page = f
            .service
            .list_for_user(&bob.id.to_string(), i64::MAX)
            .await
            .unwrap();
        assert!(page.notifications.is_empty());
        assert!(!page.next);
        assert_eq!(page.page, i64::MAX);
    }

    #[tokio::test]
    async fn test_deleted_actor_fails_listing() {
        let f = fixture();
        let alice = user("Alice");
        let bob = user("Bob");
        f.identities.insert(alice.clone());
        f.identities.insert(bob.clone());

        f.service
            .notify(Notification::new(alice.id, bob.id, NotificationKind::Comment, None))
            .await
            .unwrap();
        f.identities.remove(&alice.id);

        let result = f.service.list_for_user(&bob.id.to_string(), 1).await;
        match result {
            Err(NotificationError::MissingIdentity(id)) => assert_eq!(id, alice.id),
            other => panic!("Expected MissingIdentity, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_rejects_invalid_user_id() {
        let f = fixture();
        let result = f.service.list_for_user("bob", 1).await;
        assert!(matches!(result, Err(NotificationError::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_mark_read_updates_unread_count() {
        let f = fixture();
        let bob = Uuid::new_v4();
        f.service
            .notify(Notification::new(Uuid::new_v4(), bob, NotificationKind::Reply, None))
            .await
            .unwrap();
        let id = f.collection.snapshot()[0].id;

        f.service
            .mark_read(&bob.to_string(), &id.to_string())
            .await
            .unwrap();
        assert_eq!(f.service.unread_count(&bob.to_string()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notify_detached_skips_self_notifications() {
        let f = fixture();
        let alice = Uuid::new_v4();
        let mut rx = connect(&f.registry, alice);

        f.service
            .notify_detached(Notification::new(alice, alice, NotificationKind::LikePost, None));
        tokio::task::yield_now().await;

        assert!(f.collection.snapshot().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_detached_delivers_in_background() {
        let f = fixture();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let mut rx = connect(&f.registry, bob);

        f.service
            .notify_detached(Notification::new(alice, bob, NotificationKind::ConnectionAccepted, None));

        let delivered = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed");
        assert_eq!(payload(delivered).kind, NotificationKind::ConnectionAccepted);
    }

    #[tokio::test]
    async fn test_count_raced_by_new_notification_is_not_cached() {
        let cache = Arc::new(MemoryUnreadCountCache::new());
        let bob = Uuid::new_v4();
        let collection = Arc::new(RacingCollection {
            inner: MemoryNotificationCollection::new(),
            cache: cache.clone(),
            late: Mutex::new(Some(Notification::new(
                Uuid::new_v4(),
                bob,
                NotificationKind::Comment,
                None,
            ))),
        });
        let service = NotificationService::new(
            collection,
            Arc::new(MemoryIdentityLookup::new()),
            Dispatcher::new(Arc::new(ConnectionRegistry::new())),
            Some(cache.clone() as Arc<dyn UnreadCountCache>),
        );

        // The count taken before the late insert is returned but not cached
        assert_eq!(service.unread_count(&bob.to_string()).await.unwrap(), 0);
        assert_eq!(cache.get_unread_count(&bob).await.unwrap(), None);

        assert_eq!(service.unread_count(&bob.to_string()).await.unwrap(), 1);
        assert_eq!(cache.get_unread_count(&bob).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_cached_count_is_invalidated_by_notify_and_mark_read() {
        let cache = Arc::new(MemoryUnreadCountCache::new());
        let collection = Arc::new(MemoryNotificationCollection::new());
        let service = NotificationService::new(
            collection.clone(),
            Arc::new(MemoryIdentityLookup::new()),
            Dispatcher::new(Arc::new(ConnectionRegistry::new())),
            Some(cache.clone() as Arc<dyn UnreadCountCache>),
        );
        let bob = Uuid::new_v4();

        assert_eq!(service.unread_count(&bob.to_string()).await.unwrap(), 0);
        assert_eq!(cache.get_unread_count(&bob).await.unwrap(), Some(0));

        service
            .notify(Notification::new(Uuid::new_v4(), bob, NotificationKind::Reply, None))
            .await
            .unwrap();
        assert_eq!(cache.get_unread_count(&bob).await.unwrap(), None);
        assert_eq!(service.unread_count(&bob.to_string()).await.unwrap(), 1);

        let id = collection.snapshot()[0].id;
        service
            .mark_read(&bob.to_string(), &id.to_string())
            .await
            .unwrap();
        assert_eq!(service.unread_count(&bob.to_string()).await.unwrap(), 0);
    }
}
