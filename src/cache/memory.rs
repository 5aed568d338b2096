use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{CacheError, UnreadCountCache};

#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    count: Option<u64>,
    generation: u64,
}

/// In-process unread counters without expiry, used for local runs and tests
#[derive(Debug, Default)]
pub struct MemoryUnreadCountCache {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl MemoryUnreadCountCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UnreadCountCache for MemoryUnreadCountCache {
    async fn get_unread_count(&self, user_id: &Uuid) -> Result<Option<u64>, CacheError> {
        Ok(self.entries().get(user_id).and_then(|entry| entry.count))
    }

    async fn unread_count_generation(&self, user_id: &Uuid) -> Result<u64, CacheError> {
        Ok(self
            .entries()
            .get(user_id)
            .map(|entry| entry.generation)
            .unwrap_or(0))
    }

    async fn set_unread_count(
        &self,
        user_id: &Uuid,
        count: u64,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let mut entries = self.entries();
        let entry = entries.entry(*user_id).or_default();
        if entry.generation != generation {
            return Ok(false);
        }
        entry.count = Some(count);
        Ok(true)
    }

    async fn invalidate_unread_count(&self, user_id: &Uuid) -> Result<(), CacheError> {
        let mut entries = self.entries();
        let entry = entries.entry(*user_id).or_default();
        entry.generation += 1;
        entry.count = None;
        Ok(())
    }
}
