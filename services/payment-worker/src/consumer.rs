//! Payment worker (C5): rolls a per-process PRNG against `fail_rate` to decide
//! whether a reservation's payment succeeds. The RNG is seeded once at
//! startup, not per message — reseeding on every delivery from a fast clock
//! would correlate outcomes across bursts instead of spreading them.

use lapin::message::Delivery;
use lapin::options::BasicAckOptions;
use lapin::Channel;
use orderflow_broker::Publisher;
use orderflow_events::{routing, EventEnvelope, RawEnvelope};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::metrics::EventMetrics;

const DLQ_ROUTING_KEY: &str = "payment-worker";
const SERVICE_NAME: &str = "payment-worker";

pub struct PaymentWorker {
    retry_channel: Channel,
    publisher: Publisher,
    max_attempts: i32,
    fail_rate: u8,
    rng: Mutex<StdRng>,
    metrics: &'static EventMetrics,
}

impl PaymentWorker {
    pub fn new(
        retry_channel: Channel,
        publisher: Publisher,
        max_attempts: i32,
        fail_rate: u8,
        metrics: &'static EventMetrics,
    ) -> Self {
        Self {
            retry_channel,
            publisher,
            max_attempts,
            fail_rate,
            rng: Mutex::new(StdRng::from_entropy()),
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
        if routing_key != routing::INVENTORY_RESERVED {
            tracing::warn!(routing_key, "unexpected routing key, acking");
            let _ = delivery.ack(BasicAckOptions::default()).await;
            return;
        }

        let fails = self.roll();
        let outcome = if fails {
            self.emit_failure_triple(&envelope).await
        } else {
            self.emit_success(&envelope).await
        };

        match outcome {
            Ok(()) => {
                self.metrics.processed_total.with_label_values(&[routing_key]).inc();
                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::warn!(
                    order_id = %envelope.order_id,
                    error = %e,
                    "failed to emit payment outcome, retrying"
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

    /// `true` means this reservation fails payment, at probability `fail_rate / 100`.
    fn roll(&self) -> bool {
        let mut rng = self.rng.lock().expect("payment rng mutex poisoned");
        roll_with(&mut rng, self.fail_rate)
    }

    async fn emit_success(&self, source: &RawEnvelope) -> Result<(), orderflow_broker::BrokerError> {
        self.publish_one(source, routing::PAYMENT_PROCESSED, serde_json::json!({}))
            .await
    }

    /// Emits `payment.failed`, `inventory.release_requested`, `order.cancelled`
    /// in sequence. Partial success is not acceptable: the first publish
    /// failure aborts the whole set so the delivery retries from scratch,
    /// which may duplicate already-sent events — C4's idempotency absorbs that.
    async fn emit_failure_triple(&self, source: &RawEnvelope) -> Result<(), orderflow_broker::BrokerError> {
        let reason = orderflow_events::CompensationPayload::reason("payment_declined");
        self.publish_one(source, routing::PAYMENT_FAILED, serde_json::to_value(&reason).unwrap())
            .await?;
        self.publish_one(source, routing::INVENTORY_RELEASE_REQUESTED, serde_json::json!({}))
            .await?;
        self.publish_one(source, routing::ORDER_CANCELLED, serde_json::to_value(&reason).unwrap())
            .await?;
        Ok(())
    }

    async fn publish_one(
        &self,
        source: &RawEnvelope,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> Result<(), orderflow_broker::BrokerError> {
        let successor = EventEnvelope::new(routing_key, source.order_id, payload);
        let body = serde_json::to_vec(&successor).expect("envelope always serializes");
        self.publisher
            .publish_correlated_event(routing_key, &body, source.id)
            .await
    }
}

/// Pure roll function, split out of `PaymentWorker::roll` so it is testable
/// without a live channel/publisher.
fn roll_with(rng: &mut StdRng, fail_rate: u8) -> bool {
    rng.gen_range(0..100) < fail_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fail_rate_never_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(!roll_with(&mut rng, 0));
        }
    }

    #[test]
    fn hundred_fail_rate_always_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!(roll_with(&mut rng, 100));
        }
    }
}
