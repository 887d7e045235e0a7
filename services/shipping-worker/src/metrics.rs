use once_cell::sync::OnceCell;
use prometheus::{IntCounterVec, Opts};

pub struct EventMetrics {
    pub processed_total: IntCounterVec,
    pub deduped_total: IntCounterVec,
    pub dlq_total: IntCounterVec,
}

static METRICS: OnceCell<EventMetrics> = OnceCell::new();

impl EventMetrics {
    /// Registers the event counters against the default registry, const-labeled
    /// with `service` and labeled per-metric by `routing_key`. Idempotent:
    /// returns the already registered instance on a second call.
    pub fn register(service: &str) -> &'static EventMetrics {
        METRICS.get_or_init(|| {
            let registry = prometheus::default_registry();

            let processed_total = IntCounterVec::new(
                Opts::new("events_processed_total", "Events successfully processed")
                    .const_label("service", service),
                &["routing_key"],
            )
            .expect("metric options are valid");
            registry
                .register(Box::new(processed_total.clone()))
                .expect("metric registration should succeed at startup");

            let deduped_total = IntCounterVec::new(
                Opts::new("events_deduped_total", "Duplicate deliveries skipped")
                    .const_label("service", service),
                &["routing_key"],
            )
            .expect("metric options are valid");
            registry
                .register(Box::new(deduped_total.clone()))
                .expect("metric registration should succeed at startup");

            let dlq_total = IntCounterVec::new(
                Opts::new("events_dlq_total", "Events routed to the dead-letter exchange")
                    .const_label("service", service),
                &["routing_key"],
            )
            .expect("metric options are valid");
            registry
                .register(Box::new(dlq_total.clone()))
                .expect("metric registration should succeed at startup");

            EventMetrics {
                processed_total,
                deduped_total,
                dlq_total,
            }
        })
    }
}
