use crate::auth::middleware::AuthUser;
use crate::notification::model::{
    NotificationError, NotificationErrorResponse, NotificationPage, UnreadCountResponse,
};
use crate::websocket::notifications::NotificationState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

// Query parameters for pagination
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct NotificationsQueryParams {
    #[schema(example = "1")]
    page: Option<i64>,
}

// Helper function to convert NotificationError to HTTP response
fn notification_error_to_response(
    err: NotificationError,
) -> (StatusCode, Json<NotificationErrorResponse>) {
    let (status, error_message, code) = match err {
        NotificationError::InvalidIdentifier(raw) => {
            error!("Invalid identifier: {}", raw);
            (
                StatusCode::BAD_REQUEST,
                "Invalid identifier",
                "INVALID_IDENTIFIER",
            )
        }
        NotificationError::NotFound => (
            StatusCode::NOT_FOUND,
            "Notification not found",
            "NOT_FOUND",
        ),
        NotificationError::MissingIdentity(user_id) => {
            error!("No user record for {}", user_id);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Referenced user no longer exists",
                "MISSING_IDENTITY",
            )
        }
        NotificationError::Store(e) => {
            error!("Database error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error",
                "DB_ERROR",
            )
        }
        NotificationError::Identity(e) => {
            error!("Identity lookup error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Identity lookup failed",
                "IDENTITY_ERROR",
            )
        }
    };

    let error_response = NotificationErrorResponse {
        error: error_message.to_string(),
        code: code.to_string(),
    };

    (status, Json(error_response))
}

/// List the caller's notifications
///
/// Newest first, ten per page, each joined with the actor and recipient profiles.
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "notifications",
    params(
        ("page" = Option<i64>, Query, description = "Page number for pagination, starting at 1", example = "1")
    ),
    responses(
        (status = 200, description = "Notifications retrieved successfully", body = NotificationPage),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_notifications(
    Extension(user): Extension<AuthUser>,
    State(state): State<Arc<NotificationState>>,
    Query(params): Query<NotificationsQueryParams>,
) -> Result<(StatusCode, Json<NotificationPage>), (StatusCode, Json<NotificationErrorResponse>)> {
    let page = params.page.unwrap_or(1);
    info!("Listing notifications for user {} (page {})", user.user_id, page);

    state
        .service
        .list_for_user(&user.user_id.to_string(), page)
        .await
        .map(|page| (StatusCode::OK, Json(page)))
        .map_err(notification_error_to_response)
}

/// Count the caller's unread notifications
#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    tag = "notifications",
    responses(
        (status = 200, description = "Unread count", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_unread_count(
    Extension(user): Extension<AuthUser>,
    State(state): State<Arc<NotificationState>>,
) -> impl IntoResponse {
    match state.service.unread_count(&user.user_id.to_string()).await {
        Ok(unread_count) => {
            (StatusCode::OK, Json(UnreadCountResponse { unread_count })).into_response()
        }
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// Mark one of the caller's notifications as read
#[utoipa::path(
    patch,
    path = "/api/notifications/{id}/read",
    tag = "notifications",
    params(
        ("id" = String, Path, description = "The ID of the notification to mark as read")
    ),
    responses(
        (status = 204, description = "Notification marked as read"),
        (status = 400, description = "Malformed notification ID", body = NotificationErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Notification not found", body = NotificationErrorResponse),
        (status = 500, description = "Internal server error", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_notification_read(
    Path(notification_id): Path<String>,
    Extension(user): Extension<AuthUser>,
    State(state): State<Arc<NotificationState>>,
) -> impl IntoResponse {
    info!(
        "Marking notification {} read for user {}",
        notification_id, user.user_id
    );

    match state
        .service
        .mark_read(&user.user_id.to_string(), &notification_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}
