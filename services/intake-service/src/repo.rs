use orderflow_error::ServiceError;
use orderflow_events::{EventEnvelope, OrderCreatedPayload, OrderItemPayload};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub sku: String,
    pub qty: i32,
    pub price_cents: i64,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: String,
    pub email: String,
    pub items: Vec<NewOrderItem>,
}

pub struct OrderStatus {
    pub order_id: Uuid,
    pub status: String,
}

/// Inserts `orders`, `order_items`, and the `orders.created` outbox row in a
/// single transaction — the atomicity boundary the outbox dispatcher relies
/// on to guarantee "committed implies eventually published".
pub async fn create_order(pool: &PgPool, order: NewOrder) -> Result<Uuid, ServiceError> {
    let order_id = Uuid::new_v4();
    let total_cents: i64 = order
        .items
        .iter()
        .map(|i| i64::from(i.qty) * i.price_cents)
        .sum();

    let mut tx = pool.begin().await.map_err(ServiceError::from)?;

    sqlx::query(
        "insert into orders (id, user_id, email, status, total_cents) values ($1, $2, $3, 'created', $4)",
    )
    .bind(order_id)
    .bind(&order.user_id)
    .bind(&order.email)
    .bind(total_cents)
    .execute(&mut *tx)
    .await
    .map_err(ServiceError::from)?;

    for item in &order.items {
        sqlx::query(
            "insert into order_items (order_id, sku, qty, price_cents) values ($1, $2, $3, $4)",
        )
        .bind(order_id)
        .bind(&item.sku)
        .bind(item.qty)
        .bind(item.price_cents)
        .execute(&mut *tx)
        .await
        .map_err(ServiceError::from)?;
    }

    let payload = OrderCreatedPayload {
        user_id: order.user_id.clone(),
        email: order.email.clone(),
        total_cents,
        items: order
            .items
            .iter()
            .map(|i| OrderItemPayload {
                sku: i.sku.clone(),
                qty: i.qty,
                price_cents: i.price_cents,
            })
            .collect(),
    };
    let envelope = EventEnvelope::new(
        orderflow_events::routing::ORDERS_CREATED,
        order_id,
        payload,
    );
    let outbox_event = orderflow_outbox::NewOutboxEvent::from_envelope(&envelope)
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    orderflow_outbox::insert(&mut tx, &outbox_event)
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?;

    tx.commit().await.map_err(ServiceError::from)?;

    Ok(order_id)
}

pub async fn get_order_status(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<OrderStatus, ServiceError> {
    let row = sqlx::query_as::<_, (String,)>("select status from orders where id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await
        .map_err(ServiceError::from)?;

    match row {
        Some((status,)) => Ok(OrderStatus { order_id, status }),
        None => Err(ServiceError::NotFound(format!("order {order_id} not found"))),
    }
}
