//! De-duplication guard for the status projector (C4): a unique constraint on
//! `event_id` is the cross-instance serialization point, so concurrent
//! projector instances never apply the same event twice.

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

pub struct ProcessedEventGuard {
    pool: PgPool,
}

impl ProcessedEventGuard {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts `event_id` into `processed_events` if absent. Returns `true`
    /// when this call performed the insert (the event is new), `false` when
    /// a row already existed (the event is a duplicate delivery).
    pub async fn try_mark_processed(
        &self,
        event_id: Uuid,
        event_type: Option<&str>,
        order_id: Option<Uuid>,
    ) -> IdempotencyResult<bool> {
        let result = sqlx::query(
            "insert into processed_events (event_id, event_type, order_id) \
             values ($1, $2, $3) on conflict (event_id) do nothing",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Same as [`Self::try_mark_processed`] but runs inside a caller-owned
    /// transaction, for consumers that need the mark and the status update
    /// to commit or roll back together.
    pub async fn try_mark_processed_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event_id: Uuid,
        event_type: Option<&str>,
        order_id: Option<Uuid>,
    ) -> IdempotencyResult<bool> {
        let result = sqlx::query(
            "insert into processed_events (event_id, event_type, order_id) \
             values ($1, $2, $3) on conflict (event_id) do nothing",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(order_id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    // `try_mark_processed`'s logic is a single parameterized INSERT; its
    // dedup behavior is covered by the status-projector integration tests,
    // which exercise it against a real `processed_events` unique constraint.
}
