use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub rabbit_url: String,
    pub http_addr: String,
    pub retry_ttl_ms: i32,
    pub max_attempts: i32,
    /// Probability, 0-100, that a reservation fails payment.
    pub fail_rate: u8,
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let rabbit_url = env::var("RABBIT_URL")
            .map_err(|_| ConfigError("RABBIT_URL must be set".into()))?;
        let http_addr = crate::normalize_addr(
            &env::var("PAYMENT_WORKER_HTTP_ADDR").unwrap_or_else(|_| ":8088".to_string()),
        );
        let fail_rate: u8 = env_parsed("PAYMENT_FAIL_RATE", 30);
        if fail_rate > 100 {
            return Err(ConfigError(format!(
                "PAYMENT_FAIL_RATE must be 0-100, got {fail_rate}"
            )));
        }

        Ok(Self {
            rabbit_url,
            http_addr,
            retry_ttl_ms: env_parsed("RETRY_TTL_MS", 5000),
            max_attempts: env_parsed("MAX_ATTEMPTS", 10),
            fail_rate,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
