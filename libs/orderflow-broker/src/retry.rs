//! Retry/DLQ protocol (C3): every worker falls through here on processing
//! failure instead of nacking the original delivery, so redelivery is capped
//! and driven by the retry exchange's TTL rather than the broker's own
//! (uncapped) requeue.

use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::BasicProperties;
use tracing::warn;

use crate::error::{BrokerError, BrokerResult};
use crate::{read_attempts, HEADER_ATTEMPTS, HEADER_ERROR, HEADER_OUTBOX_ID};
use crate::{EXCHANGE_DLX, EXCHANGE_RETRY};

/// Which branch `retry_or_dlq` took, so callers can count dead-letters that
/// come from exhausting the retry budget and not just from malformed payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Retried,
    DeadLettered,
}

/// Republishes `delivery` through the retry exchange if it has budget left,
/// otherwise dead-letters it. Acks the original delivery on either successful
/// republish; nacks with requeue on a republish failure so the broker
/// redelivers and this is attempted again.
pub async fn retry_or_dlq(
    channel: &lapin::Channel,
    delivery: &Delivery,
    service: &str,
    max_attempts: i32,
    dlq_routing_key: &str,
    error: Option<&str>,
) -> BrokerResult<RetryOutcome> {
    let original_routing_key = delivery.routing_key.as_str();
    let attempts = read_attempts(delivery.properties.headers().as_ref());
    let next_attempts = attempts + 1;

    let mut headers = delivery
        .properties
        .headers()
        .clone()
        .unwrap_or_default();
    headers.insert(HEADER_ATTEMPTS.into(), AMQPValue::LongInt(next_attempts));

    let outcome = if next_attempts <= max_attempts {
        RetryOutcome::Retried
    } else {
        RetryOutcome::DeadLettered
    };

    let republished = if outcome == RetryOutcome::Retried {
        let retry_routing_key = format!("{service}.{original_routing_key}");
        publish(
            channel,
            EXCHANGE_RETRY,
            &retry_routing_key,
            &delivery.data,
            headers,
        )
        .await
    } else {
        if let Some(err) = error {
            headers.insert(HEADER_ERROR.into(), AMQPValue::LongString(err.into()));
        }
        warn!(
            service,
            routing_key = original_routing_key,
            attempts = next_attempts,
            "max attempts exceeded, dead-lettering"
        );
        publish(channel, EXCHANGE_DLX, dlq_routing_key, &delivery.data, headers).await
    };

    match republished {
        Ok(()) => {
            delivery
                .ack(BasicAckOptions::default())
                .await
                .map_err(BrokerError::Ack)?;
            Ok(outcome)
        }
        Err(e) => {
            warn!(service, error = %e, "retry/DLQ republish failed, nacking for redelivery");
            delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
                .map_err(BrokerError::Ack)?;
            Ok(RetryOutcome::Retried)
        }
    }
}

/// Routes a malformed delivery (unparseable body, missing mandatory fields)
/// straight to the service's DLQ — never retried, because the defect is in
/// the payload, not a transient condition.
pub async fn send_to_dlq_malformed(
    channel: &lapin::Channel,
    delivery: &Delivery,
    dlq_routing_key: &str,
    error: &str,
) -> BrokerResult<()> {
    let mut headers = FieldTable::default();
    headers.insert(HEADER_ERROR.into(), AMQPValue::LongString(error.into()));

    match publish(channel, EXCHANGE_DLX, dlq_routing_key, &delivery.data, headers).await {
        Ok(()) => delivery
            .ack(BasicAckOptions::default())
            .await
            .map_err(BrokerError::Ack),
        Err(e) => delivery
            .nack(BasicNackOptions {
                requeue: true,
                ..Default::default()
            })
            .await
            .map_err(|_| e),
    }
}

async fn publish(
    channel: &lapin::Channel,
    exchange: &str,
    routing_key: &str,
    body: &[u8],
    headers: FieldTable,
) -> BrokerResult<()> {
    use lapin::options::BasicPublishOptions;

    let properties = BasicProperties::default()
        .with_content_type("application/json".into())
        .with_headers(headers);

    orderflow_resilience::with_timeout(
        crate::PUBLISH_TIMEOUT,
        channel.basic_publish(
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

/// `x-outbox-id` is carried through retries untouched; convenience accessor
/// for workers that want to log it.
pub fn outbox_id(delivery: &Delivery) -> Option<String> {
    delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|h| h.inner().get(HEADER_OUTBOX_ID))
        .and_then(|v| match v {
            AMQPValue::LongString(s) => Some(s.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_routing_key_composes_service_and_original() {
        let service = "inventory-worker";
        let original = "orders.created";
        assert_eq!(
            format!("{service}.{original}"),
            "inventory-worker.orders.created"
        );
    }
}
