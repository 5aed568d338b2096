use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{CacheError, UnreadCountCache};

// Redis cache key prefixes
pub const UNREAD_COUNT_KEY_PREFIX: &str = "notifications:unread";
pub const UNREAD_GENERATION_KEY_PREFIX: &str = "notifications:unread-gen";
const DEFAULT_UNREAD_COUNT_TTL_SECONDS: u64 = 300; // 5 minutes

// KEYS[1] count, KEYS[2] generation; ARGV count, expected generation, ttl
const SET_IF_GENERATION: &str = r#"
if (redis.call('GET', KEYS[2]) or '0') == ARGV[2] then
    redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
    return 1
end
return 0
"#;

#[derive(Debug, Clone)]
pub struct RedisCache {
    client: Client,
    unread_count_ttl: Duration,
}

impl RedisCache {
    pub fn new(client: Client, unread_count_ttl: Option<Duration>) -> Self {
        // Connection validation will happen on first use
        Self {
            client,
            unread_count_ttl: unread_count_ttl
                .unwrap_or(Duration::from_secs(DEFAULT_UNREAD_COUNT_TTL_SECONDS)),
        }
    }

    pub fn unread_count_key(user_id: &Uuid) -> String {
        format!("{}:{}", UNREAD_COUNT_KEY_PREFIX, user_id)
    }

    pub fn unread_generation_key(user_id: &Uuid) -> String {
        format!("{}:{}", UNREAD_GENERATION_KEY_PREFIX, user_id)
    }
}

#[async_trait]
impl UnreadCountCache for RedisCache {
    // Get a user's cached unread notification count
    async fn get_unread_count(&self, user_id: &Uuid) -> Result<Option<u64>, CacheError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let result: Option<u64> = connection.get(Self::unread_count_key(user_id)).await?;

        if result.is_some() {
            debug!("Cache hit for unread count of user {}", user_id);
        } else {
            debug!("Cache miss for unread count of user {}", user_id);
        }

        Ok(result)
    }

    async fn unread_count_generation(&self, user_id: &Uuid) -> Result<u64, CacheError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let generation: Option<u64> = connection
            .get(Self::unread_generation_key(user_id))
            .await?;
        Ok(generation.unwrap_or(0))
    }

    // Cache a user's unread count if nothing invalidated it since `generation` was read
    async fn set_unread_count(
        &self,
        user_id: &Uuid,
        count: u64,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let script = Script::new(SET_IF_GENERATION);
        let mut invocation = script.key(Self::unread_count_key(user_id));
        invocation
            .key(Self::unread_generation_key(user_id))
            .arg(count)
            .arg(generation)
            .arg(self.unread_count_ttl.as_secs().max(1));

        let stored: i64 = invocation.invoke_async(&mut connection).await?;
        Ok(stored == 1)
    }

    // Invalidate a user's unread count after a notification is added or read
    async fn invalidate_unread_count(&self, user_id: &Uuid) -> Result<(), CacheError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let (): () = redis::pipe()
            .atomic()
            .incr(Self::unread_generation_key(user_id), 1)
            .ignore()
            .del(Self::unread_count_key(user_id))
            .ignore()
            .query_async(&mut connection)
            .await?;
        Ok(())
    }
}
