pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;
use uuid::Uuid;

pub use memory::MemoryIdentityLookup;
pub use postgres::PgIdentityLookup;

/// Public projection of a user, as shown next to a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserView {
    #[schema(value_type = UuidWrapper)]
    pub id: Uuid,
    #[schema(example = "Alice Smith")]
    pub name: String,
    #[schema(example = "alice@example.edu")]
    pub email: String,
    pub school: String,
    pub department: String,
    pub follow_count: i32,
    pub academic_year: i32,
    pub profile_image_url: String,
    pub is_teacher: bool,
    /// Verified account badge
    pub blue_badge: bool,
    pub is_complete: bool,
    #[schema(value_type = DateTimeWrapper)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = DateTimeWrapper)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Identity lookup failed: {0}")]
    Lookup(String),
}

/// Batch resolution of user ids to display records.
///
/// Ids that do not resolve are simply absent from the returned map; deciding
/// whether that is an error is up to the caller.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn resolve(&self, ids: &HashSet<Uuid>) -> Result<HashMap<Uuid, UserView>, IdentityError>;
}
