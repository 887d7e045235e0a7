use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rabbit_url: String,
    pub outbox_http_addr: String,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub backoff_max_secs: u64,
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("POSTGRES_DSN")
            .or_else(|_| env::var("PG_DSN"))
            .map_err(|_| ConfigError("POSTGRES_DSN (or legacy PG_DSN) must be set".into()))?;
        let rabbit_url = env::var("RABBIT_URL")
            .map_err(|_| ConfigError("RABBIT_URL must be set".into()))?;
        let outbox_http_addr =
            crate::normalize_addr(&env::var("OUTBOX_HTTP_ADDR").unwrap_or_else(|_| ":8085".to_string()));

        Ok(Self {
            database_url,
            rabbit_url,
            outbox_http_addr,
            poll_interval: Duration::from_millis(env_parsed("OUTBOX_POLL_INTERVAL_MS", 500)),
            batch_size: env_parsed("OUTBOX_BATCH_SIZE", 100),
            max_attempts: env_parsed("OUTBOX_MAX_ATTEMPTS", 10),
            backoff_max_secs: env_parsed("OUTBOX_BACKOFF_MAX_SECS", 60),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
