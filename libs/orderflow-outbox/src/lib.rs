//! Transactional outbox: insertion helper for producers (intake) and the
//! polling dispatcher (C2) that drains committed rows to the broker.
//!
//! Unlike a processor that reads rows, releases the transaction, and updates
//! each row in its own statement, this dispatcher does the whole poll cycle —
//! select-for-update-skip-locked, publish, and every row update — inside one
//! transaction, committed once at the end. That is what lets several
//! dispatcher instances run concurrently without double-publishing a row.

pub mod error;
pub mod metrics;

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use error::{OutboxError, OutboxResult};
pub use metrics::OutboxMetrics;
use orderflow_broker::Publisher;

pub struct NewOutboxEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    pub fn from_envelope<T: Serialize>(
        envelope: &orderflow_events::EventEnvelope<T>,
    ) -> OutboxResult<Self> {
        Ok(Self {
            id: envelope.id,
            order_id: envelope.order_id,
            event_type: envelope.event_type.clone(),
            payload: serde_json::to_value(envelope)?,
        })
    }
}

/// Inserts an outbox row inside `tx` — callers MUST use the same transaction
/// as the aggregate write (orders + order_items), never a separate one, or
/// the atomicity the dispatcher relies on does not hold.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    event: &NewOutboxEvent,
) -> OutboxResult<()> {
    sqlx::query(
        "insert into outbox_events (id, order_id, event_type, payload, attempts, next_attempt_at, created_at) \
         values ($1, $2, $3, $4, 0, now(), now())",
    )
    .bind(event.id)
    .bind(event.order_id)
    .bind(&event.event_type)
    .bind(&event.payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(Clone)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub backoff_max_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_attempts: 10,
            backoff_max_secs: 60,
        }
    }
}

/// `min(max(2^attempt seconds, 1s), backoff_max_secs)`.
pub fn backoff(attempt: i32, backoff_max_secs: u64) -> Duration {
    let exp = 2u64.saturating_pow(attempt.max(0) as u32);
    Duration::from_secs(exp.max(1).min(backoff_max_secs))
}

struct PendingRow {
    id: Uuid,
    order_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    attempts: i32,
}

fn row_from_sql(row: PgRow) -> Result<PendingRow, sqlx::Error> {
    Ok(PendingRow {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        attempts: row.try_get("attempts")?,
    })
}

pub struct OutboxDispatcher {
    pool: PgPool,
    publisher: Publisher,
    config: DispatcherConfig,
    metrics: &'static OutboxMetrics,
}

impl OutboxDispatcher {
    pub fn new(
        pool: PgPool,
        publisher: Publisher,
        config: DispatcherConfig,
        service_name: &str,
    ) -> Self {
        Self {
            pool,
            publisher,
            config,
            metrics: OutboxMetrics::register(service_name),
        }
    }

    /// Runs the poll loop until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "outbox dispatcher starting"
        );
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("outbox dispatcher shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "outbox poll cycle failed");
                    }
                    if let Err(e) = self.refresh_pending_metrics().await {
                        warn!(error = %e, "failed to refresh outbox pending metrics");
                    }
                }
            }
        }
    }

    /// One poll cycle: select a batch with `FOR UPDATE SKIP LOCKED`, publish
    /// or mark-dropped each row, commit once. Returns the number of rows
    /// examined.
    pub async fn tick(&self) -> OutboxResult<usize> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "select id, order_id, event_type, payload, attempts from outbox_events \
             where sent_at is null and next_attempt_at <= now() \
             order by created_at limit $1 for update skip locked",
        )
        .bind(self.config.batch_size)
        .fetch_all(&mut *tx)
        .await?;

        let count = rows.len();
        for row in rows {
            let row = row_from_sql(row)?;
            self.process_row(&mut tx, row).await?;
        }

        tx.commit().await?;
        Ok(count)
    }

    async fn process_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        row: PendingRow,
    ) -> OutboxResult<()> {
        if row.attempts >= self.config.max_attempts {
            warn!(
                outbox_id = %row.id,
                order_id = %row.order_id,
                event_type = %row.event_type,
                attempts = row.attempts,
                "max attempts reached, marking sent without delivery"
            );
            sqlx::query(
                "update outbox_events set sent_at = now(), last_error = 'max attempts reached' where id = $1",
            )
            .bind(row.id)
            .execute(&mut **tx)
            .await?;
            return Ok(());
        }

        let body = serde_json::to_vec(&row.payload)?;
        match self
            .publisher
            .publish_outbox_event(&row.event_type, &body, row.id, row.attempts)
            .await
        {
            Ok(()) => {
                debug!(outbox_id = %row.id, order_id = %row.order_id, event_type = %row.event_type, "published outbox row");
                self.metrics.published_total.inc();
                sqlx::query("update outbox_events set sent_at = now(), last_error = null where id = $1")
                    .bind(row.id)
                    .execute(&mut **tx)
                    .await?;
            }
            Err(e) => {
                let next_attempts = row.attempts + 1;
                let delay = backoff(next_attempts, self.config.backoff_max_secs);
                warn!(
                    outbox_id = %row.id,
                    order_id = %row.order_id,
                    event_type = %row.event_type,
                    attempts = next_attempts,
                    error = %e,
                    "outbox publish failed, backing off"
                );
                self.metrics.publish_errors_total.inc();
                sqlx::query(
                    "update outbox_events set attempts = $2, next_attempt_at = now() + $3::interval, last_error = $4 where id = $1",
                )
                .bind(row.id)
                .bind(next_attempts)
                .bind(format!("{} seconds", delay.as_secs()))
                .bind(e.to_string())
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }

    async fn refresh_pending_metrics(&self) -> Result<(), sqlx::Error> {
        let row = sqlx::query(
            "select count(*) as pending, \
             coalesce(extract(epoch from (now() - min(created_at))), 0)::bigint as oldest_age \
             from outbox_events where sent_at is null",
        )
        .fetch_one(&self.pool)
        .await?;
        let pending: i64 = row.try_get("pending")?;
        let oldest_age: i64 = row.try_get("oldest_age")?;
        self.metrics.pending.set(pending);
        self.metrics.oldest_pending_age_seconds.set(oldest_age);
        Ok(())
    }

    pub async fn pending_count(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("select count(*) as pending from outbox_events where sent_at is null")
            .fetch_one(&self.pool)
            .await?;
        row.try_get("pending")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_monotone_and_capped() {
        assert_eq!(backoff(0, 60).as_secs(), 1);
        assert_eq!(backoff(1, 60).as_secs(), 2);
        assert_eq!(backoff(2, 60).as_secs(), 4);
        assert_eq!(backoff(6, 60).as_secs(), 60);
        assert_eq!(backoff(20, 60).as_secs(), 60);
    }

    #[test]
    fn backoff_floor_is_one_second() {
        assert_eq!(backoff(0, 60).as_secs(), 1);
    }
}
