use std::collections::HashSet;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::identity::IdentityLookup;
use crate::notification::model::{Notification, NotificationError, NotificationView, PAGE_SIZE};

/// Joins a page of notifications with the users they reference
#[derive(Clone)]
pub struct ViewAssembler {
    identities: Arc<dyn IdentityLookup>,
}

impl ViewAssembler {
    pub fn new(identities: Arc<dyn IdentityLookup>) -> Self {
        Self { identities }
    }

    /// Build display records for a raw page fetched with one lookahead row.
    ///
    /// Returns the views in input order and whether a following page exists.
    /// Every actor and recipient must resolve; an orphaned notification fails
    /// the whole page with `MissingIdentity`.
    pub async fn assemble(
        &self,
        mut raw: Vec<Notification>,
    ) -> Result<(Vec<NotificationView>, bool), NotificationError> {
        let has_next = raw.len() > PAGE_SIZE;
        raw.truncate(PAGE_SIZE);

        if raw.is_empty() {
            return Ok((Vec::new(), has_next));
        }

        let ids: HashSet<Uuid> = raw
            .iter()
            .flat_map(|n| [n.actor, n.recipient])
            .collect();

        let users = self.identities.resolve(&ids).await?;

        let views = raw
            .into_iter()
            .map(|n| {
                let user = users.get(&n.actor).cloned().ok_or_else(|| {
                    error!("Notification {} references unknown actor {}", n.id, n.actor);
                    NotificationError::MissingIdentity(n.actor)
                })?;
                let to = users.get(&n.recipient).cloned().ok_or_else(|| {
                    error!(
                        "Notification {} references unknown recipient {}",
                        n.id, n.recipient
                    );
                    NotificationError::MissingIdentity(n.recipient)
                })?;

                Ok(NotificationView {
                    id: n.id,
                    user,
                    to,
                    kind: n.kind,
                    content: n.content,
                    content_id: n.content_id,
                    is_read: n.is_read,
                    created_at: n.created_at,
                })
            })
            .collect::<Result<Vec<_>, NotificationError>>()?;

        Ok((views, has_next))
    }
}
