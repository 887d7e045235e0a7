//! Order status enum and the routing-key → status projection table used by the
//! status projector (C4).

use serde::{Deserialize, Serialize};

use crate::routing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Reserved,
    Paid,
    ShippingScheduled,
    Completed,
    Cancelled,
    InventoryFailed,
    PaymentFailed,
}

impl OrderStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Reserved => "reserved",
            OrderStatus::Paid => "paid",
            OrderStatus::ShippingScheduled => "shipping_scheduled",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::InventoryFailed => "inventory_failed",
            OrderStatus::PaymentFailed => "payment_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// The canonical routing-key → status mapping. `inventory.failed` and
/// `payment.failed` map to `Cancelled`, not their diagnostic-only enum
/// counterparts — see DESIGN.md for the reasoning. Returns `None` for routing
/// keys the projector should ack-and-skip.
pub fn map_routing_key_to_status(routing_key: &str) -> Option<OrderStatus> {
    match routing_key {
        routing::ORDERS_CREATED => Some(OrderStatus::Created),
        routing::INVENTORY_RESERVED => Some(OrderStatus::Reserved),
        routing::INVENTORY_FAILED => Some(OrderStatus::Cancelled),
        routing::PAYMENT_PROCESSED => Some(OrderStatus::Paid),
        routing::PAYMENT_FAILED => Some(OrderStatus::Cancelled),
        routing::SHIPPING_SCHEDULED => Some(OrderStatus::ShippingScheduled),
        routing::ORDER_COMPLETED => Some(OrderStatus::Completed),
        routing::ORDER_CANCELLED
        | routing::INVENTORY_RELEASE_REQUESTED
        | routing::INVENTORY_RELEASED => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_routing_keys() {
        assert_eq!(
            map_routing_key_to_status(routing::ORDERS_CREATED),
            Some(OrderStatus::Created)
        );
        assert_eq!(
            map_routing_key_to_status(routing::PAYMENT_FAILED),
            Some(OrderStatus::Cancelled)
        );
        assert_eq!(
            map_routing_key_to_status(routing::INVENTORY_RELEASED),
            Some(OrderStatus::Cancelled)
        );
    }

    #[test]
    fn unknown_routing_key_is_none() {
        assert_eq!(map_routing_key_to_status("something.else"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
    }
}
