use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error};
use uuid::Uuid;

use super::{IdentityError, IdentityLookup, UserView};

/// Resolves users from the `global.users` table
#[derive(Debug, Clone)]
pub struct PgIdentityLookup {
    pool: PgPool,
}

impl PgIdentityLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityLookup for PgIdentityLookup {
    async fn resolve(&self, ids: &HashSet<Uuid>) -> Result<HashMap<Uuid, UserView>, IdentityError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<Uuid> = ids.iter().copied().collect();
        debug!("Resolving {} user identities", ids.len());

        let users = sqlx::query_as::<_, UserView>(
            r#"
            SELECT id, username AS name, email, school, department, follow_count,
                   academic_year, profile_image_url, is_teacher, blue_badge,
                   is_complete, created_at, updated_at
            FROM global.users
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to resolve user identities: {}", e);
            IdentityError::Database(e)
        })?;

        Ok(users.into_iter().map(|user| (user.id, user)).collect())
    }
}
