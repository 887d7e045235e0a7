use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rabbit_url: String,
    pub http_addr: String,
    pub retry_ttl_ms: i32,
    pub max_attempts: i32,
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
        let http_addr = crate::normalize_addr(
            &env::var("STATUS_PROJECTOR_HTTP_ADDR").unwrap_or_else(|_| ":8086".to_string()),
        );

        Ok(Self {
            database_url,
            rabbit_url,
            http_addr,
            retry_ttl_ms: env_parsed("RETRY_TTL_MS", 5000),
            max_attempts: env_parsed("MAX_ATTEMPTS", 10),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
