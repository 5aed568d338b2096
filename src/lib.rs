pub mod api_doc;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod identity;
pub mod notification;
pub mod routes;
pub mod schema_ext;
pub mod websocket;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_doc::ApiDoc;
use crate::websocket::notifications::NotificationState;

/// Build the full HTTP router around a shared notification state
pub fn app(notification_state: Arc<NotificationState>) -> Router {
    Router::new()
        // API documentation
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Health routes
        .merge(routes::health::routes())
        // Notification history and live socket
        .merge(routes::notifications::routes(notification_state))
        .route("/", get(|| async { "Campus notification service" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
