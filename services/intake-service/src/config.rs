use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_addr: String,
    pub order_status_url: Option<String>,
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

        let http_addr = env::var("HTTP_ADDR").unwrap_or_else(|_| ":8080".to_string());
        let order_status_url = env::var("ORDER_STATUS_URL").ok();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            http_addr: normalize_addr(&http_addr),
            order_status_url,
            log_level,
        })
    }
}

/// The spec's addresses are written Go-style (`:8080`); bind to all
/// interfaces when no host is given.
pub fn normalize_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_port() {
        assert_eq!(normalize_addr(":8080"), "0.0.0.0:8080");
    }

    #[test]
    fn leaves_explicit_host_alone() {
        assert_eq!(normalize_addr("127.0.0.1:8080"), "127.0.0.1:8080");
    }
}
