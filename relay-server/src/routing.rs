// relay-server/src/routing.rs
use actix_web::{web, HttpRequest, HttpResponse, Error};
use actix_web_actors::ws;
use common::Config;

use crate::actors::client_session_actor::ClientSessionActor;
use crate::registry::{ClientConnection, ConnectionRegistry};

/// Configure routes for the WebSocket listener
pub fn routes(cfg: &mut web::ServiceConfig, ws_path: &str) {
    cfg.service(
        web::resource(ws_path)
            .route(web::get().to(relay_ws_route))
    );
}

/// Upgrade a browser connection and register it under a fresh client id
async fn relay_ws_route(
    req: HttpRequest,
    stream: web::Payload,
    registry: web::Data<ConnectionRegistry>,
    config: web::Data<Config>,
) -> Result<HttpResponse, Error> {
    let client_id = registry.next_client_id();
    let session = ClientSessionActor::new(
        client_id.clone(),
        registry.get_ref().clone(),
        config.heartbeat.clone(),
    );

    // Register before the response goes out so the id is routable
    // by the time the peer reads its greeting
    ws::WsResponseBuilder::new(session, &req, stream)
        .start_with_addr()
        .map(|(addr, resp)| {
            registry.register(ClientConnection::new(client_id, addr));
            resp
        })
}
