use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::StoreError;
use crate::identity::{IdentityError, UserView};

/// Number of notifications per page. The store fetches one more than this
/// to detect a following page, and the view assembler trims back to it.
pub const PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Comment,
    Reply,
    LikePost,
    LikeComment,
    LikeJobPost,
    #[serde(alias = "sent-connection-request")]
    ConnectionRequest,
    ConnectionAccepted,
    PostBlocked,
    PostUnblocked,
    JobBlocked,
    JobDeleted,
    PostDeleted,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 12] = [
        NotificationKind::Comment,
        NotificationKind::Reply,
        NotificationKind::LikePost,
        NotificationKind::LikeComment,
        NotificationKind::LikeJobPost,
        NotificationKind::ConnectionRequest,
        NotificationKind::ConnectionAccepted,
        NotificationKind::PostBlocked,
        NotificationKind::PostUnblocked,
        NotificationKind::JobBlocked,
        NotificationKind::JobDeleted,
        NotificationKind::PostDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Comment => "comment",
            NotificationKind::Reply => "reply",
            NotificationKind::LikePost => "like-post",
            NotificationKind::LikeComment => "like-comment",
            NotificationKind::LikeJobPost => "like-job-post",
            NotificationKind::ConnectionRequest => "connection-request",
            NotificationKind::ConnectionAccepted => "connection-accepted",
            NotificationKind::PostBlocked => "post-blocked",
            NotificationKind::PostUnblocked => "post-unblocked",
            NotificationKind::JobBlocked => "job-blocked",
            NotificationKind::JobDeleted => "job-deleted",
            NotificationKind::PostDeleted => "post-deleted",
        }
    }

    /// Like notifications are never refreshed once they exist
    pub fn is_like(&self) -> bool {
        matches!(
            self,
            NotificationKind::LikePost | NotificationKind::LikeComment | NotificationKind::LikeJobPost
        )
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            NotificationKind::Comment => "You have a new comment on your post.",
            NotificationKind::Reply => "You have a new reply on your comment.",
            NotificationKind::LikePost => "You have a new like on your post.",
            NotificationKind::LikeComment => "You have a new like on your comment.",
            NotificationKind::LikeJobPost => "You have a new like on your job post.",
            NotificationKind::ConnectionRequest => "You received a new connection request.",
            NotificationKind::ConnectionAccepted => "Your connection request was accepted.",
            NotificationKind::PostBlocked => "Your post was blocked by our content validation system. We will review it and unblock it if it's valid.",
            NotificationKind::PostUnblocked => "Your post has been reviewed and unblocked by our admins.",
            NotificationKind::JobBlocked => "Your job post was blocked by our content validation system. We will review it and unblock it if it's valid.",
            NotificationKind::JobDeleted => "Your job post has been deleted because it violated our terms of service.",
            NotificationKind::PostDeleted => "Your post has been deleted because it violated our terms of service.",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "sent-connection-request" {
            return Ok(NotificationKind::ConnectionRequest);
        }
        NotificationKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid notification kind: {}", s))
    }
}

/// Moderation decisions that produce a notification for the content owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ModerationAction {
    Delete,
    DeleteJob,
    #[serde(rename = "hide")]
    Block,
    JobBlock,
    Ignore,
    IgnoreJob,
    Approve,
}

impl ModerationAction {
    pub fn notification_kind(&self) -> NotificationKind {
        match self {
            ModerationAction::Delete => NotificationKind::PostDeleted,
            ModerationAction::DeleteJob => NotificationKind::JobDeleted,
            ModerationAction::Block | ModerationAction::Ignore => NotificationKind::PostBlocked,
            ModerationAction::JobBlock | ModerationAction::IgnoreJob => NotificationKind::JobBlocked,
            ModerationAction::Approve => NotificationKind::PostUnblocked,
        }
    }
}

impl FromStr for ModerationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete" => Ok(ModerationAction::Delete),
            "delete-job" => Ok(ModerationAction::DeleteJob),
            "hide" => Ok(ModerationAction::Block),
            "job-block" => Ok(ModerationAction::JobBlock),
            "ignore" => Ok(ModerationAction::Ignore),
            "ignore-job" => Ok(ModerationAction::IgnoreJob),
            "approve" => Ok(ModerationAction::Approve),
            _ => Err(format!("Invalid moderation action: {}", s)),
        }
    }
}

/// Persisted notification record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    #[schema(value_type = UuidWrapper)]
    pub id: Uuid,
    /// User who caused the event
    #[schema(value_type = UuidWrapper)]
    #[serde(rename = "user_id")]
    pub actor: Uuid,
    #[schema(value_type = UuidWrapper)]
    #[serde(rename = "to")]
    pub recipient: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub content: String,
    /// Post, comment or job the notification is about
    #[schema(value_type = Option<UuidWrapper>)]
    pub content_id: Option<Uuid>,
    pub is_read: bool,
    #[schema(value_type = DateTimeWrapper)]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// New unread notification carrying the kind's default message
    pub fn new(
        actor: Uuid,
        recipient: Uuid,
        kind: NotificationKind,
        content_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            recipient,
            kind,
            content: kind.default_message().to_string(),
            content_id,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Notification joined with the users on both ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationView {
    #[schema(value_type = UuidWrapper)]
    pub id: Uuid,
    /// The actor
    pub user: UserView,
    /// The recipient
    pub to: UserView,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub content: String,
    #[schema(value_type = Option<UuidWrapper>)]
    pub content_id: Option<Uuid>,
    pub is_read: bool,
    #[schema(value_type = DateTimeWrapper)]
    pub created_at: DateTime<Utc>,
}

/// One page of a user's notifications
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationPage {
    pub notifications: Vec<NotificationView>,
    /// Whether a following page exists
    #[schema(example = "false")]
    pub next: bool,
    #[schema(example = "1")]
    pub page: i64,
    #[schema(example = "3")]
    pub unread_count: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountResponse {
    #[schema(example = "3")]
    pub unread_count: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Missing identity for user {0}")]
    MissingIdentity(Uuid),

    #[error("Notification not found")]
    NotFound,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Error response for the notification API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationErrorResponse {
    #[schema(example = "Invalid user identifier")]
    pub error: String,
    #[schema(example = "INVALID_IDENTIFIER")]
    pub code: String,
}

/// Parse a user or notification id, failing before any store access
pub fn parse_identifier(raw: &str) -> Result<Uuid, NotificationError> {
    Uuid::parse_str(raw.trim()).map_err(|_| NotificationError::InvalidIdentifier(raw.to_string()))
}
