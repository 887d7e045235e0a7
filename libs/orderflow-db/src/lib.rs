//! Postgres pool construction shared by every service.
//!
//! Trimmed from a much larger connection-budget-aware pool library: the
//! per-service connection table that library carried doesn't apply here (this
//! system has six small services, not thirty), so only the env-driven
//! defaults and the metrics/verification wiring survive.

mod metrics;

use std::fmt;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, error, info};

pub use metrics::update_pool_metrics;

#[derive(Clone)]
pub struct DbConfig {
    pub service_name: String,
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("service_name", &self.service_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

/// Error raised when neither `POSTGRES_DSN` nor the legacy `PG_DSN` fallback
/// is set. Always a `FatalStartupError` for the caller.
#[derive(Debug, thiserror::Error)]
#[error("POSTGRES_DSN is not set (PG_DSN legacy fallback also unset)")]
pub struct MissingDsn;

impl DbConfig {
    /// Reads `POSTGRES_DSN`, falling back to the legacy `PG_DSN` variable.
    pub fn from_env(service_name: &str) -> Result<Self, MissingDsn> {
        let database_url = std::env::var("POSTGRES_DSN")
            .or_else(|_| std::env::var("PG_DSN"))
            .map_err(|_| MissingDsn)?;

        Ok(Self {
            service_name: service_name.to_string(),
            database_url,
            max_connections: env_parsed("DB_MAX_CONNECTIONS", 10),
            min_connections: env_parsed("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_parsed("DB_CONNECT_TIMEOUT_SECS", 5),
            acquire_timeout_secs: env_parsed("DB_ACQUIRE_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_parsed("DB_IDLE_TIMEOUT_SECS", 600),
            max_lifetime_secs: env_parsed("DB_MAX_LIFETIME_SECS", 1800),
        })
    }

    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            connect_timeout_secs = self.connect_timeout_secs,
            acquire_timeout_secs = self.acquire_timeout_secs,
            "database pool configuration"
        );
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Creates a pool and verifies connectivity with a `SELECT 1` bounded by
/// `connect_timeout_secs` (5s by default, per the concurrency model's DB
/// connect deadline). Spawns a background task refreshing pool gauges.
pub async fn create_pool(config: DbConfig) -> Result<PgPool, sqlx::Error> {
    debug!(service = %config.service_name, "creating database pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
        .connect(&config.database_url)
        .await?;

    match tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        sqlx::query("SELECT 1").execute(&pool),
    )
    .await
    {
        Ok(Ok(_)) => {
            info!(service = %config.service_name, "database pool created and verified");

            update_pool_metrics(&pool, &config.service_name);
            let pool_clone = pool.clone();
            let service = config.service_name.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    update_pool_metrics(&pool_clone, &service);
                }
            });

            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(service = %config.service_name, error = %e, "database connection verification failed");
            Err(e)
        }
        Err(_) => {
            error!(service = %config.service_name, "database connection verification timed out");
            Err(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "database verification timeout",
            )))
        }
    }
}

pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    debug!("running database migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("database migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn from_env_uses_postgres_dsn() {
        std::env::remove_var("PG_DSN");
        std::env::set_var("POSTGRES_DSN", "postgres://localhost/orderflow");
        let config = DbConfig::from_env("intake").unwrap();
        assert_eq!(config.database_url, "postgres://localhost/orderflow");
        std::env::remove_var("POSTGRES_DSN");
    }

    #[test]
    #[serial_test::serial]
    fn from_env_falls_back_to_legacy_pg_dsn() {
        std::env::remove_var("POSTGRES_DSN");
        std::env::set_var("PG_DSN", "postgres://localhost/legacy");
        let config = DbConfig::from_env("intake").unwrap();
        assert_eq!(config.database_url, "postgres://localhost/legacy");
        std::env::remove_var("PG_DSN");
    }

    #[test]
    #[serial_test::serial]
    fn from_env_errors_without_either_var() {
        std::env::remove_var("POSTGRES_DSN");
        std::env::remove_var("PG_DSN");
        assert!(DbConfig::from_env("intake").is_err());
    }
}
