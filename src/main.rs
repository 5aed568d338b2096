use dotenvy::dotenv;
use redis::Client;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use campus_notifications::cache::{RedisCache, UnreadCountCache};
use campus_notifications::config::AppConfig;
use campus_notifications::db::{self, PgNotificationCollection};
use campus_notifications::identity::PgIdentityLookup;
use campus_notifications::notification::service::NotificationService;
use campus_notifications::websocket::{
    dispatcher::Dispatcher, notifications::NotificationState, registry::ConnectionRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists
    dotenv().ok();

    // Initialize logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("campus_notifications=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    if std::env::var("JWT_SECRET").is_err() {
        warn!("JWT_SECRET is not set; every token will be rejected");
    }

    // Create connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(&config.database_url)
        .await?;

    // Check if the database is initialized
    if !db::check_db_initialized(&pool).await {
        info!("Initializing notification schema");
        db::init_db(&pool).await?;
    }

    // Initialize Redis cache if configured
    let unread_cache = if let Some(url) = &config.redis_url {
        info!("Initializing Redis cache with URL: {}", url);
        match Client::open(url.as_str()) {
            Ok(client) => {
                let cache = RedisCache::new(client, Some(config.unread_count_ttl));
                Some(Arc::new(cache) as Arc<dyn UnreadCountCache>)
            }
            Err(e) => {
                error!("Failed to connect to Redis: {}", e);
                None
            }
        }
    } else {
        info!("No Redis URL configured, proceeding without cache");
        None
    };

    let registry = Arc::new(ConnectionRegistry::new());
    let notification_service = Arc::new(NotificationService::new(
        Arc::new(PgNotificationCollection::new(pool.clone())),
        Arc::new(PgIdentityLookup::new(pool.clone())),
        Dispatcher::new(registry.clone()),
        unread_cache,
    ));

    let notification_state = Arc::new(NotificationState {
        registry,
        service: notification_service,
        heartbeat: config.ws_heartbeat,
    });

    let app = campus_notifications::app(notification_state);

    let addr = config.socket_addr();
    info!("Server listening on http://{}", addr);
    info!("API documentation: http://{}/docs", addr);
    info!(
        "WebSocket notifications: ws://{}/api/notifications/ws?token=<JWT>",
        addr
    );

    axum::Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
