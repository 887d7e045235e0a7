//! The status projector (C4): folds every order event into the `orders.status`
//! column. Idempotent via `processed_events`, and the update itself is
//! terminal-guarded so a stray redelivery can never move an order out of a
//! terminal state.

use lapin::message::Delivery;
use lapin::Channel;
use orderflow_events::{status, RawEnvelope};
use orderflow_idempotency::ProcessedEventGuard;
use sqlx::PgPool;

use crate::metrics::EventMetrics;

pub struct Projector {
    pool: PgPool,
    channel: Channel,
    max_attempts: i32,
    metrics: &'static EventMetrics,
}

const DLQ_ROUTING_KEY: &str = "status-projector";

impl Projector {
    pub fn new(pool: PgPool, channel: Channel, max_attempts: i32, metrics: &'static EventMetrics) -> Self {
        Self {
            pool,
            channel,
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
                    &self.channel,
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
        let Some(new_status) = status::map_routing_key_to_status(routing_key) else {
            tracing::debug!(routing_key, "routing key carries no status projection, acking");
            let _ = delivery.ack(lapin::options::BasicAckOptions::default()).await;
            return;
        };

        match self.apply(&envelope, new_status).await {
            Ok(deduped) => {
                if deduped {
                    self.metrics.deduped_total.with_label_values(&[routing_key]).inc();
                } else {
                    self.metrics.processed_total.with_label_values(&[routing_key]).inc();
                }
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %envelope.id,
                    order_id = %envelope.order_id,
                    error = %e,
                    "failed to apply status projection, retrying"
                );
                match orderflow_broker::retry::retry_or_dlq(
                    &self.channel,
                    &delivery,
                    "status-projector",
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
                return;
            }
        }

        let _ = delivery.ack(lapin::options::BasicAckOptions::default()).await;
    }

    /// Returns `Ok(true)` when the event was a duplicate and the projection
    /// was skipped, `Ok(false)` when it was newly applied.
    async fn apply(
        &self,
        envelope: &RawEnvelope,
        new_status: status::OrderStatus,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let is_new = ProcessedEventGuard::try_mark_processed_tx(
            &mut tx,
            envelope.id,
            Some(envelope.event_type.as_str()),
            Some(envelope.order_id),
        )
        .await
        .map_err(|e| match e {
            orderflow_idempotency::IdempotencyError::Database(e) => e,
        })?;

        if !is_new {
            tx.rollback().await?;
            tracing::debug!(event_id = %envelope.id, "duplicate delivery, skipping projection");
            return Ok(true);
        }

        let result = sqlx::query(
            "update orders set status = $1, updated_at = now() \
             where id = $2 and status not in ('completed', 'cancelled')",
        )
        .bind(new_status.as_db_str())
        .bind(envelope.order_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                order_id = %envelope.order_id,
                status = new_status.as_db_str(),
                "order already terminal or missing, status update skipped"
            );
        }

        tx.commit().await?;
        Ok(false)
    }
}
