//! AMQP 0-9-1 topology and retry/DLQ protocol shared by every broker-connected
//! service.
//!
//! The source this system is grounded on tied one process to one shared
//! channel; here every publisher and consumer owns its own channel instead,
//! and topology declaration is idempotent so a task that loses its channel
//! can simply reconnect and redeclare before resuming.

pub mod error;
pub mod retry;
pub mod topology;

use std::time::Duration;

use lapin::options::BasicPublishOptions;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

pub use error::BrokerError;

pub const EXCHANGE_EVENTS: &str = "orders.events";
pub const EXCHANGE_RETRY: &str = "orders.retry";
pub const EXCHANGE_DLX: &str = "orders.dlx";

/// Every broker publish is bounded by this deadline per the concurrency
/// model; a publish that doesn't confirm within it is treated as failed.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

pub const HEADER_ATTEMPTS: &str = "x-attempts";
pub const HEADER_CORRELATION_ID: &str = "x-correlation-id";
pub const HEADER_ORIGINAL_ROUTING_KEY: &str = "x-original-routing-key";
pub const HEADER_OUTBOX_ID: &str = "x-outbox-id";
pub const HEADER_ERROR: &str = "x-error";

/// Opens one connection and one channel. Callers that need several
/// independent publishers/consumers open several channels on the same
/// connection (`connection.create_channel()`), matching the one-connection,
/// many-channels guidance for this kind of service.
pub async fn connect(url: &str) -> Result<Connection, BrokerError> {
    Connection::connect(url, ConnectionProperties::default())
        .await
        .map_err(BrokerError::Connection)
}

/// Thin wrapper around a channel bound to the events exchange, used by every
/// component that emits events (the outbox dispatcher and the saga workers).
pub struct Publisher {
    channel: Channel,
}

impl Publisher {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Publishes `body` to `exchange` with `routing_key`, carrying the given
    /// headers, bounded by [`PUBLISH_TIMEOUT`].
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        headers: FieldTable,
    ) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_headers(headers);

        orderflow_resilience::with_timeout(
            PUBLISH_TIMEOUT,
            self.channel.basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            ),
        )
        .await
        .map_err(|_| BrokerError::PublishTimeout)?
        .map_err(BrokerError::Publish)?
        .await
        .map_err(BrokerError::Publish)?;

        Ok(())
    }

    /// Publishes an `orders.events` routed event with `x-outbox-id` and
    /// `x-attempts` headers, as used by the outbox dispatcher (C2).
    pub async fn publish_outbox_event(
        &self,
        routing_key: &str,
        body: &[u8],
        outbox_id: uuid::Uuid,
        attempts: i32,
    ) -> Result<(), BrokerError> {
        let mut headers = FieldTable::default();
        headers.insert(
            HEADER_OUTBOX_ID.into(),
            AMQPValue::LongString(outbox_id.to_string().into()),
        );
        headers.insert(HEADER_ATTEMPTS.into(), AMQPValue::LongInt(attempts));
        self.publish(EXCHANGE_EVENTS, routing_key, body, headers)
            .await
    }

    /// Publishes a successor event carrying `x-correlation-id`, as emitted by
    /// the saga workers (C5).
    pub async fn publish_correlated_event(
        &self,
        routing_key: &str,
        body: &[u8],
        correlation_id: uuid::Uuid,
    ) -> Result<(), BrokerError> {
        let mut headers = FieldTable::default();
        headers.insert(
            HEADER_CORRELATION_ID.into(),
            AMQPValue::LongString(correlation_id.to_string().into()),
        );
        self.publish(EXCHANGE_EVENTS, routing_key, body, headers)
            .await
    }
}

/// Reads the `x-attempts` header off a set of properties, defaulting to 0 when
/// absent (first delivery).
pub fn read_attempts(headers: Option<&FieldTable>) -> i32 {
    headers
        .and_then(|h| h.inner().get(HEADER_ATTEMPTS))
        .and_then(|v| match v {
            AMQPValue::LongInt(n) => Some(*n),
            AMQPValue::ShortInt(n) => Some(*n as i32),
            AMQPValue::LongLongInt(n) => Some(*n as i32),
            _ => None,
        })
        .unwrap_or(0)
}
