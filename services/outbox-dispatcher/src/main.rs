mod config;
mod http;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use orderflow_outbox::{DispatcherConfig, OutboxDispatcher};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub(crate) fn normalize_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cfg.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(outbox_http_addr = %cfg.outbox_http_addr, "starting outbox-dispatcher");

    let db_config = orderflow_db::DbConfig {
        database_url: cfg.database_url.clone(),
        ..orderflow_db::DbConfig::from_env("outbox-dispatcher")
            .unwrap_or_else(|_| orderflow_db::DbConfig::default())
    };
    let pool = orderflow_resilience::with_retry(orderflow_resilience::RetryConfig::default(), || {
        orderflow_db::create_pool(db_config.clone())
    })
    .await
    .map_err(|e| anyhow::anyhow!("database connection failed after retry budget: {e}"))?;

    let connection = orderflow_resilience::with_retry(orderflow_resilience::RetryConfig::default(), || {
        orderflow_broker::connect(&cfg.rabbit_url)
    })
    .await
    .map_err(|e| anyhow::anyhow!("broker connection failed after retry budget: {e}"))?;
    let publish_channel = connection.create_channel().await?;
    orderflow_broker::topology::declare_base(&publish_channel).await?;
    let publisher = orderflow_broker::Publisher::new(publish_channel);

    let dispatcher = Arc::new(OutboxDispatcher::new(
        pool,
        publisher,
        DispatcherConfig {
            poll_interval: cfg.poll_interval,
            batch_size: cfg.batch_size,
            max_attempts: cfg.max_attempts,
            backoff_max_secs: cfg.backoff_max_secs,
        },
        "outbox-dispatcher",
    ));

    let dispatcher_for_loop = dispatcher.clone();
    let poll_task = tokio::spawn(async move {
        dispatcher_for_loop.run(shutdown_signal()).await;
    });

    let http_addr = cfg.outbox_http_addr.clone();
    let dispatcher_data = web::Data::new(dispatcher.clone());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(dispatcher_data.clone())
            .wrap(tracing_actix_web::TracingLogger::default())
            .route("/health", web::get().to(http::health))
            .route("/metrics", web::get().to(http::metrics))
            .route("/outbox/pending", web::get().to(http::pending))
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

    poll_task.await.ok();
    tracing::info!("outbox-dispatcher shutdown complete");
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
