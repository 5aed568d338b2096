use crate::auth::middleware::auth_middleware;
use crate::notification::controller::{
    get_unread_count, list_notifications, mark_notification_read,
};
use crate::websocket::notifications::{ws_handler, NotificationState};
use axum::{
    middleware,
    routing::{get, patch},
    Router,
};
use std::sync::Arc;

/// Create a router for notification routes
pub fn routes(notification_state: Arc<NotificationState>) -> Router {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(get_unread_count))
        .route("/api/notifications/:id/read", patch(mark_notification_read))
        // Bearer auth for the REST routes above
        .route_layer(middleware::from_fn(auth_middleware))
        // The socket authenticates with a query token instead
        .route("/api/notifications/ws", get(ws_handler))
        .with_state(notification_state)
}
