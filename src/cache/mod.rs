pub mod memory;
pub mod redis;

use async_trait::async_trait;
use uuid::Uuid;

pub use self::memory::MemoryUnreadCountCache;
pub use self::redis::RedisCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Cached per-user unread counters.
///
/// Every invalidation bumps the user's generation. A count computed after
/// reading generation `g` is only stored while the generation is still `g`,
/// so a count raced by a new notification is never cached.
#[async_trait]
pub trait UnreadCountCache: Send + Sync {
    async fn get_unread_count(&self, user_id: &Uuid) -> Result<Option<u64>, CacheError>;

    async fn unread_count_generation(&self, user_id: &Uuid) -> Result<u64, CacheError>;

    /// Store `count` unless the generation moved past `generation`.
    /// Returns whether it was stored.
    async fn set_unread_count(
        &self,
        user_id: &Uuid,
        count: u64,
        generation: u64,
    ) -> Result<bool, CacheError>;

    async fn invalidate_unread_count(&self, user_id: &Uuid) -> Result<(), CacheError>;
}
