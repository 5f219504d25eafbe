// relay-server/src/api/mod.rs
pub mod health;
pub mod webhook;

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(health::index)
        .service(health::health)
        .service(
            actix_web::web::scope("/api")
                .service(webhook::receive_webhook)
        );
}
