//! Exchange/queue declaration for the events/retry/dlx topology described in
//! the broker topology design. Declaration is idempotent: every call uses
//! `declare` (never `passive`) with matching arguments, so a reconnecting
//! consumer can safely redeclare its own topology before resuming.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};

use crate::error::{BrokerError, BrokerResult};
use crate::{EXCHANGE_DLX, EXCHANGE_EVENTS, EXCHANGE_RETRY};

/// Declares the three durable topic exchanges every service depends on.
pub async fn declare_base(channel: &Channel) -> BrokerResult<()> {
    for exchange in [EXCHANGE_EVENTS, EXCHANGE_RETRY, EXCHANGE_DLX] {
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BrokerError::Topology)?;
    }
    Ok(())
}

/// A consumer queue bound to one or more `events` routing keys, with
/// dead-lettering to the service's own DLQ.
pub struct QueueSpec<'a> {
    pub queue_name: &'a str,
    pub routing_keys: &'a [&'a str],
    pub dlq_routing_key: &'a str,
}

/// Declares `spec.queue_name`'s DLQ (bound to `dlx` with `dlq_routing_key`),
/// then the main queue itself (dead-lettering to that DLQ), then binds the
/// main queue to `events` for each routing key in `spec.routing_keys`.
pub async fn declare_queue_with_dlq(channel: &Channel, spec: &QueueSpec<'_>) -> BrokerResult<()> {
    let dlq_name = format!("{}.dlq", spec.queue_name);
    channel
        .queue_declare(
            &dlq_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(BrokerError::Topology)?;
    channel
        .queue_bind(
            &dlq_name,
            EXCHANGE_DLX,
            spec.dlq_routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(BrokerError::Topology)?;

    let mut args = FieldTable::default();
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(EXCHANGE_DLX.into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(spec.dlq_routing_key.into()),
    );
    channel
        .queue_declare(
            spec.queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            args,
        )
        .await
        .map_err(BrokerError::Topology)?;

    for routing_key in spec.routing_keys {
        channel
            .queue_bind(
                spec.queue_name,
                EXCHANGE_EVENTS,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(BrokerError::Topology)?;
    }

    Ok(())
}

/// Declares a `(service, original_routing_key)` retry queue: bound to `retry`
/// with key `<service>.<original_routing_key>`, TTL `ttl_ms`, and
/// dead-lettering back into `events` with the original routing key. A message
/// that sits out its TTL here re-enters the main flow automatically.
pub async fn declare_retry_queue(
    channel: &Channel,
    service: &str,
    original_routing_key: &str,
    ttl_ms: i32,
) -> BrokerResult<()> {
    let retry_routing_key = format!("{service}.{original_routing_key}");
    let queue_name = format!("{service}.retry.{original_routing_key}");

    let mut args = FieldTable::default();
    args.insert("x-message-ttl".into(), AMQPValue::LongInt(ttl_ms));
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(EXCHANGE_EVENTS.into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(original_routing_key.into()),
    );

    channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            args,
        )
        .await
        .map_err(BrokerError::Topology)?;

    channel
        .queue_bind(
            &queue_name,
            EXCHANGE_RETRY,
            &retry_routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(BrokerError::Topology)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_routing_key_format() {
        let service = "payment-worker";
        let original = "inventory.reserved";
        assert_eq!(
            format!("{service}.{original}"),
            "payment-worker.inventory.reserved"
        );
    }
}
