//! Routing-key constants shared by every publisher and consumer, so a typo in a
//! literal string can't silently desync a producer from its subscriber.

pub const ORDERS_CREATED: &str = "orders.created";
pub const INVENTORY_RESERVED: &str = "inventory.reserved";
pub const INVENTORY_RELEASE_REQUESTED: &str = "inventory.release_requested";
pub const INVENTORY_RELEASED: &str = "inventory.released";
pub const INVENTORY_FAILED: &str = "inventory.failed";
pub const PAYMENT_PROCESSED: &str = "payment.processed";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const SHIPPING_SCHEDULED: &str = "shipping.scheduled";
pub const ORDER_CANCELLED: &str = "order.cancelled";
pub const ORDER_COMPLETED: &str = "order.completed";

pub const ALL: &[&str] = &[
    ORDERS_CREATED,
    INVENTORY_RESERVED,
    INVENTORY_RELEASE_REQUESTED,
    INVENTORY_RELEASED,
    INVENTORY_FAILED,
    PAYMENT_PROCESSED,
    PAYMENT_FAILED,
    SHIPPING_SCHEDULED,
    ORDER_CANCELLED,
    ORDER_COMPLETED,
];
