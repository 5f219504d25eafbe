// relay-server/src/api/health.rs
use actix_web::{get, web, HttpResponse, Responder};
use serde_json::json;

use crate::registry::ConnectionRegistry;

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "Webhook Relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[get("/health")]
pub async fn health(registry: web::Data<ConnectionRegistry>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "connections": registry.len()
    }))
}
