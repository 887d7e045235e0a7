use actix_web::{web, HttpResponse};
use orderflow_outbox::OutboxDispatcher;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub pending: i64,
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

pub async fn pending(dispatcher: web::Data<Arc<OutboxDispatcher>>) -> HttpResponse {
    match dispatcher.pending_count().await {
        Ok(pending) => HttpResponse::Ok().json(PendingResponse { pending }),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read outbox pending count");
            HttpResponse::InternalServerError().finish()
        }
    }
}
