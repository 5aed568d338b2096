use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Security scheme configuration for OpenAPI
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        // Tokens are issued by the auth service; this one only validates them
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

/// API documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campus Notifications API",
        version = "0.1.0",
        description = "Notification history and live delivery over /api/notifications/ws?token=<JWT>"
    ),
    paths(
        crate::routes::health::health_check,
        crate::notification::controller::list_notifications,
        crate::notification::controller::get_unread_count,
        crate::notification::controller::mark_notification_read
    ),
    components(
        schemas(
            crate::routes::health::HealthResponse,
            crate::notification::model::NotificationKind,
            crate::notification::model::NotificationView,
            crate::notification::model::NotificationPage,
            crate::notification::model::UnreadCountResponse,
            crate::notification::model::NotificationErrorResponse,
            crate::identity::UserView,
            crate::schema_ext::DateTimeWrapper,
            crate::schema_ext::UuidWrapper
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "notifications", description = "Notification history endpoints")
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;
