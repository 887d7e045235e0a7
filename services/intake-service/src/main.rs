mod config;
mod handlers;
mod repo;

use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env().map_err(|e| {
        eprintln!("fatal: {e}");
        e
    })?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cfg.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(http_addr = %cfg.http_addr, "starting intake-service");

    let db_config = orderflow_db::DbConfig {
        database_url: cfg.database_url.clone(),
        ..orderflow_db::DbConfig::from_env("intake-service")
            .unwrap_or_else(|_| orderflow_db::DbConfig::default())
    };
    db_config.log_config();
    let pool = orderflow_resilience::with_retry(orderflow_resilience::RetryConfig::default(), || {
        orderflow_db::create_pool(db_config.clone())
    })
    .await
    .map_err(|e| anyhow::anyhow!("database connection failed after retry budget: {e}"))?;
    orderflow_db::migrate(&pool).await?;

    let http_addr = cfg.http_addr.clone();
    let pool_data = web::Data::new(pool);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool_data.clone())
            .wrap(tracing_actix_web::TracingLogger::default())
            .route("/health", web::get().to(handlers::health))
            .route("/metrics", web::get().to(handlers::metrics))
            .route("/api/v1/orders", web::post().to(handlers::create_order))
            .route("/api/v1/orders/{id}", web::get().to(handlers::get_order))
    })
    .bind(&http_addr)?
    .shutdown_timeout(10)
    .run();

    tokio::select! {
        result = server => result.map_err(anyhow::Error::from)?,
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("intake-service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
