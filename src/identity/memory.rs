use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use uuid::Uuid;

use super::{IdentityError, IdentityLookup, UserView};

/// In-process identity directory, used for local runs and tests
#[derive(Debug, Default)]
pub struct MemoryIdentityLookup {
    users: RwLock<HashMap<Uuid, UserView>>,
}

impl MemoryIdentityLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserView>) -> Self {
        let lookup = Self::new();
        for user in users {
            lookup.insert(user);
        }
        lookup
    }

    pub fn insert(&self, user: UserView) {
        let mut users = self
            .users
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        users.insert(user.id, user);
    }

    /// Drop a user, leaving any notifications that reference it orphaned
    pub fn remove(&self, id: &Uuid) -> Option<UserView> {
        let mut users = self
            .users
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        users.remove(id)
    }
}

#[async_trait]
impl IdentityLookup for MemoryIdentityLookup {
    async fn resolve(&self, ids: &HashSet<Uuid>) -> Result<HashMap<Uuid, UserView>, IdentityError> {
        let users = self
            .users
            .read()
            .map_err(|_| IdentityError::Lookup("identity directory lock poisoned".to_string()))?;

        Ok(ids
            .iter()
            .filter_map(|id| users.get(id).map(|user| (*id, user.clone())))
            .collect())
    }
}
