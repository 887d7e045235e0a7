use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use orderflow_error::ServiceError;

use crate::repo::{self, NewOrder, NewOrderItem};

#[derive(Debug, Deserialize)]
pub struct CreateOrderItemRequest {
    pub sku: String,
    pub qty: i32,
    pub price_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub email: String,
    pub items: Vec<CreateOrderItemRequest>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub status: String,
}

fn validate(req: &CreateOrderRequest) -> Result<(), ServiceError> {
    if req.user_id.trim().is_empty() {
        return Err(ServiceError::Validation("user_id is required".into()));
    }
    if req.email.trim().is_empty() {
        return Err(ServiceError::Validation("email is required".into()));
    }
    if req.items.is_empty() {
        return Err(ServiceError::Validation("at least one item is required".into()));
    }
    for item in &req.items {
        if item.sku.trim().is_empty() {
            return Err(ServiceError::Validation("item sku is required".into()));
        }
        if item.qty < 1 {
            return Err(ServiceError::Validation("item qty must be >= 1".into()));
        }
        if item.price_cents < 0 {
            return Err(ServiceError::Validation("item price_cents must be >= 0".into()));
        }
    }
    Ok(())
}

pub async fn create_order(
    pool: web::Data<PgPool>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ServiceError> {
    validate(&body)?;

    let order = NewOrder {
        user_id: body.user_id.clone(),
        email: body.email.clone(),
        items: body
            .items
            .iter()
            .map(|i| NewOrderItem {
                sku: i.sku.clone(),
                qty: i.qty,
                price_cents: i.price_cents,
            })
            .collect(),
    };

    let order_id = repo::create_order(&pool, order)
        .await
        .map_err(|e| match e {
            ServiceError::Validation(_) | ServiceError::NotFound(_) => e,
            _ => ServiceError::Database("failed to create order".into()),
        })?;

    Ok(HttpResponse::Created().json(CreateOrderResponse { id: order_id }))
}

pub async fn get_order(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let order_id = path.into_inner();
    let status = repo::get_order_status(&pool, order_id).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse {
        order_id: status.order_id,
        status: status.status,
    }))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

pub async fn metrics() -> HttpResponse {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: "u1".into(),
            email: "u@x.test".into(),
            items: vec![CreateOrderItemRequest {
                sku: "A".into(),
                qty: 2,
                price_cents: 500,
            }],
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate(&sample_request()).is_ok());
    }

    #[test]
    fn empty_items_is_rejected() {
        let mut req = sample_request();
        req.items.clear();
        assert!(matches!(validate(&req), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn zero_qty_is_rejected() {
        let mut req = sample_request();
        req.items[0].qty = 0;
        assert!(matches!(validate(&req), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn negative_price_is_rejected() {
        let mut req = sample_request();
        req.items[0].price_cents = -1;
        assert!(matches!(validate(&req), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn blank_user_id_is_rejected() {
        let mut req = sample_request();
        req.user_id = "  ".into();
        assert!(matches!(validate(&req), Err(ServiceError::Validation(_))));
    }
}
