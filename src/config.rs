use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Errors raised while reading configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9500;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_HEARTBEAT_SECONDS: u64 = 30;
const DEFAULT_UNREAD_COUNT_TTL_SECONDS: u64 = 300;

/// Application configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub host: IpAddr,
    pub port: u16,
    pub max_db_connections: u32,
    pub ws_heartbeat: Duration,
    pub unread_count_ttl: Duration,
}

impl AppConfig {
    /// Build the config from process environment variables.
    ///
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let redis_url = lookup("REDIS_URL").filter(|v| !v.trim().is_empty());

        let host = match lookup("HOST") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "HOST",
                value,
            })?,
            None => DEFAULT_HOST.parse().map_err(|_| ConfigError::Invalid {
                name: "HOST",
                value: DEFAULT_HOST.to_string(),
            })?,
        };

        Ok(Self {
            database_url,
            redis_url,
            host,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            max_db_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            ws_heartbeat: Duration::from_secs(
                parse_or(&lookup, "WS_HEARTBEAT_SECONDS", DEFAULT_HEARTBEAT_SECONDS)?.max(1),
            ),
            unread_count_ttl: Duration::from_secs(parse_or(
                &lookup,
                "UNREAD_COUNT_TTL_SECONDS",
                DEFAULT_UNREAD_COUNT_TTL_SECONDS,
            )?),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
