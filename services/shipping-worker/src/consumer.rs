//! Shipping worker (C5): the final saga step. On a processed payment it
//! schedules shipping and closes the order out as completed. Both emissions
//! are treated as one atomic set, per the same partial-success rule as the
//! other workers.

use lapin::message::Delivery;
use lapin::options::BasicAckOptions;
use lapin::Channel;
use orderflow_broker::Publisher;
use orderflow_events::{routing, EventEnvelope, RawEnvelope};

use crate::metrics::EventMetrics;

const DLQ_ROUTING_KEY: &str = "shipping-worker";
const SERVICE_NAME: &str = "shipping-worker";

pub struct ShippingWorker {
    retry_channel: Channel,
    publisher: Publisher,
    max_attempts: i32,
    metrics: &'static EventMetrics,
}

impl ShippingWorker {
    pub fn new(
        retry_channel: Channel,
        publisher: Publisher,
        max_attempts: i32,
        metrics: &'static EventMetrics,
    ) -> Self {
        Self {
            retry_channel,
            publisher,
            max_attempts,
            metrics,
        }
    }

    pub async fn handle(&self, delivery: Delivery) {
        let envelope = match RawEnvelope::parse(&delivery.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "malformed event, dead-lettering");
                match orderflow_broker::retry::send_to_dlq_malformed(
                    &self.retry_channel,
                    &delivery,
                    DLQ_ROUTING_KEY,
                    &e.to_string(),
                )
                .await
                {
                    Ok(()) => self
                        .metrics
                        .dlq_total
                        .with_label_values(&[delivery.routing_key.as_str()])
                        .inc(),
                    Err(e) => tracing::error!(error = %e, "failed to dead-letter malformed event"),
                }
                return;
            }
        };

        let routing_key = delivery.routing_key.as_str();
        if routing_key != routing::PAYMENT_PROCESSED {
            tracing::warn!(routing_key, "unexpected routing key, acking");
            let _ = delivery.ack(BasicAckOptions::default()).await;
            return;
        }

        match self.emit_completion_set(&envelope).await {
            Ok(()) => {
                self.metrics.processed_total.with_label_values(&[routing_key]).inc();
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::warn!(
                    order_id = %envelope.order_id,
                    error = %e,
                    "failed to emit shipping/completion events, retrying"
                );
                match orderflow_broker::retry::retry_or_dlq(
                    &self.retry_channel,
                    &delivery,
                    SERVICE_NAME,
                    self.max_attempts,
                    DLQ_ROUTING_KEY,
                    Some(&e.to_string()),
                )
                .await
                {
                    Ok(orderflow_broker::retry::RetryOutcome::DeadLettered) => {
                        self.metrics.dlq_total.with_label_values(&[routing_key]).inc();
                    }
                    Ok(orderflow_broker::retry::RetryOutcome::Retried) => {}
                    Err(e) => tracing::error!(error = %e, "failed to retry/dead-letter event"),
                }
            }
        }
    }

    async fn emit_completion_set(&self, source: &RawEnvelope) -> Result<(), orderflow_broker::BrokerError> {
        self.publish_one(source, routing::SHIPPING_SCHEDULED).await?;
        self.publish_one(source, routing::ORDER_COMPLETED).await?;
        Ok(())
    }

    async fn publish_one(
        &self,
        source: &RawEnvelope,
        routing_key: &str,
    ) -> Result<(), orderflow_broker::BrokerError> {
        let successor = EventEnvelope::new(routing_key, source.order_id, serde_json::json!({}));
        let body = serde_json::to_vec(&successor).expect("envelope always serializes");
        self.publisher
            .publish_correlated_event(routing_key, &body, source.id)
            .await
    }
}
