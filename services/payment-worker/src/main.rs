mod config;
mod consumer;
mod metrics;

use actix_web::{web, App, HttpResponse, HttpServer};
use futures_lite::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicQosOptions};
use lapin::types::FieldTable;
use orderflow_broker::topology::{declare_queue_with_dlq, QueueSpec};
use orderflow_broker::Publisher;
use orderflow_events::routing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const QUEUE_NAME: &str = "payment-worker";
const ROUTING_KEYS: &[&str] = &[routing::INVENTORY_RESERVED];

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

    tracing::info!(fail_rate = cfg.fail_rate, "starting payment-worker");

    let connection = orderflow_resilience::with_retry(orderflow_resilience::RetryConfig::default(), || {
        orderflow_broker::connect(&cfg.rabbit_url)
    })
    .await
    .map_err(|e| anyhow::anyhow!("broker connection failed after retry budget: {e}"))?;
    let consume_channel = connection.create_channel().await?;
    let publish_channel = connection.create_channel().await?;

    orderflow_broker::topology::declare_base(&consume_channel).await?;
    declare_queue_with_dlq(
        &consume_channel,
        &QueueSpec {
            queue_name: QUEUE_NAME,
            routing_keys: ROUTING_KEYS,
            dlq_routing_key: QUEUE_NAME,
        },
    )
    .await?;
    for routing_key in ROUTING_KEYS {
        orderflow_broker::topology::declare_retry_queue(
            &consume_channel,
            QUEUE_NAME,
            routing_key,
            cfg.retry_ttl_ms,
        )
        .await?;
    }
    consume_channel
        .basic_qos(20, BasicQosOptions::default())
        .await?;

    let event_metrics = metrics::EventMetrics::register(QUEUE_NAME);

    let worker = std::sync::Arc::new(consumer::PaymentWorker::new(
        consume_channel.clone(),
        Publisher::new(publish_channel),
        cfg.max_attempts,
        cfg.fail_rate,
        event_metrics,
    ));

    let consumer_task = tokio::spawn(async move {
        let mut consumer = match consume_channel
            .basic_consume(
                QUEUE_NAME,
                QUEUE_NAME,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                tracing::error!(error = %e, "failed to start consuming, exiting");
                return;
            }
        };

        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => worker.handle(delivery).await,
                Err(e) => tracing::warn!(error = %e, "delivery error from broker"),
            }
        }
    });

    let http_addr = cfg.http_addr.clone();
    let server = HttpServer::new(|| {
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics))
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

    consumer_task.abort();
    tracing::info!("payment-worker shutdown complete");
    Ok(())
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn metrics() -> HttpResponse {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
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
