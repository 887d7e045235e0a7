use once_cell::sync::OnceCell;
use prometheus::{IntCounter, IntGauge, Opts};

pub struct OutboxMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub published_total: IntCounter,
    pub publish_errors_total: IntCounter,
}

static METRICS: OnceCell<OutboxMetrics> = OnceCell::new();

impl OutboxMetrics {
    /// Registers the outbox gauges/counters against the default registry,
    /// const-labeled with `service`. Idempotent: returns the already
    /// registered instance on a second call within the same process.
    pub fn register(service: &str) -> &'static OutboxMetrics {
        METRICS.get_or_init(|| {
            let registry = prometheus::default_registry();

            let pending = IntGauge::with_opts(
                Opts::new("outbox_pending", "Unsent outbox rows").const_label("service", service),
            )
            .expect("metric options are valid");
            registry
                .register(Box::new(pending.clone()))
                .expect("metric registration should succeed at startup");

            let oldest_pending_age_seconds = IntGauge::with_opts(
                Opts::new(
                    "outbox_oldest_pending_age_seconds",
                    "Age in seconds of the oldest unsent outbox row",
                )
                .const_label("service", service),
            )
            .expect("metric options are valid");
            registry
                .register(Box::new(oldest_pending_age_seconds.clone()))
                .expect("metric registration should succeed at startup");

            let published_total = IntCounter::with_opts(
                Opts::new("outbox_published_total", "Outbox rows successfully published")
                    .const_label("service", service),
            )
            .expect("metric options are valid");
            registry
                .register(Box::new(published_total.clone()))
                .expect("metric registration should succeed at startup");

            let publish_errors_total = IntCounter::with_opts(
                Opts::new("outbox_publish_errors_total", "Outbox publish failures")
                    .const_label("service", service),
            )
            .expect("metric options are valid");
            registry
                .register(Box::new(publish_errors_total.clone()))
                .expect("metric registration should succeed at startup");

            OutboxMetrics {
                pending,
                oldest_pending_age_seconds,
                published_total,
                publish_errors_total,
            }
        })
    }
}
