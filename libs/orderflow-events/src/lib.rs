//! Wire event envelope and payload types shared by every order-fulfillment service.
//!
//! The envelope is the unit of transport between the outbox dispatcher, the broker,
//! and every consumer. `id` doubles as the idempotency key enforced by the status
//! projector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod routing;
pub mod status;

pub const SCHEMA_VERSION: u32 = 1;

/// Generic envelope, `T` is a concrete payload type (or `serde_json::Value` for
/// consumers that only need to route, not fully deserialize).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: u32,
    pub time: DateTime<Utc>,
    pub order_id: Uuid,
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(event_type: impl Into<String>, order_id: Uuid, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            version: SCHEMA_VERSION,
            time: Utc::now(),
            order_id,
            payload,
        }
    }
}

/// Envelope shape used by consumers before they know (or care about) the payload
/// type — routing and idempotency only need `id`, `type`, and `order_id`.
pub type RawEnvelope = EventEnvelope<serde_json::Value>;

impl RawEnvelope {
    /// Parses a delivery body, rejecting envelopes missing mandatory fields.
    /// Malformed bodies are a `ValidationError` per the error taxonomy — callers
    /// route them straight to DLQ, never through the retry exchange.
    pub fn parse(body: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: RawEnvelope =
            serde_json::from_slice(body).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        if envelope.event_type.is_empty() {
            return Err(EnvelopeError::Malformed("missing type".into()));
        }
        if envelope.id.is_nil() {
            return Err(EnvelopeError::Malformed("missing id".into()));
        }
        if envelope.order_id.is_nil() {
            return Err(EnvelopeError::Malformed("missing order_id".into()));
        }
        Ok(envelope)
    }

    pub fn typed_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed event envelope: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemPayload {
    pub sku: String,
    pub qty: i32,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedPayload {
    pub user_id: String,
    pub email: String,
    pub total_cents: i64,
    pub items: Vec<OrderItemPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompensationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
}

impl CompensationPayload {
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn tracking(tracking: impl Into<String>) -> Self {
        Self {
            tracking: Some(tracking.into()),
            ..Default::default()
        }
    }

    pub fn note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = EventEnvelope::new(
            routing::ORDERS_CREATED,
            Uuid::new_v4(),
            OrderCreatedPayload {
                user_id: "u1".into(),
                email: "u@x.test".into(),
                total_cents: 1000,
                items: vec![OrderItemPayload {
                    sku: "A".into(),
                    qty: 2,
                    price_cents: 500,
                }],
            },
        );
        let body = serde_json::to_vec(&envelope).unwrap();
        let parsed = RawEnvelope::parse(&body).unwrap();
        assert_eq!(parsed.id, envelope.id);
        assert_eq!(parsed.event_type, routing::ORDERS_CREATED);
        let payload: OrderCreatedPayload = parsed.typed_payload().unwrap();
        assert_eq!(payload.total_cents, 1000);
    }

    #[test]
    fn parse_rejects_missing_order_id() {
        let body = br#"{"id":"3fa85f64-5717-4562-b3fc-2c963f66afa6","type":"orders.created","version":1,"time":"2024-01-01T00:00:00Z","order_id":"00000000-0000-0000-0000-000000000000","payload":{}}"#;
        let err = RawEnvelope::parse(body).unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn parse_rejects_garbage_json() {
        let err = RawEnvelope::parse(b"not json").unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }
}
