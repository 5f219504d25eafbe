// relay-server/src/lib.rs
pub mod actors;
pub mod api;
pub mod dispatch;
pub mod registry;
pub mod routing;

#[cfg(test)]
pub(crate) mod mock;

use actix_web::{dev::Server, web, App, HttpServer};
use common::Config;
use std::net::TcpListener;

pub use dispatch::{dispatch, DispatchError, Outbound};
pub use registry::{ClientConnection, ClientSocket, ConnectionRegistry, SocketError};

/// HTTP application: webhook, health and index routes
pub fn http_server(listener: TcpListener, registry: ConnectionRegistry) -> std::io::Result<Server> {
    let registry_data = web::Data::new(registry);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(registry_data.clone())
            .configure(api::configure)
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Dedicated WebSocket listener serving the relay path
pub fn ws_server(listener: TcpListener, registry: ConnectionRegistry, config: Config) -> std::io::Result<Server> {
    let ws_path = config.ws_path.clone();
    let registry_data = web::Data::new(registry);
    let config_data = web::Data::new(config);

    let server = HttpServer::new(move || {
        let ws_path = ws_path.clone();
        App::new()
            .app_data(registry_data.clone())
            .app_data(config_data.clone())
            .configure(|cfg| routing::routes(cfg, &ws_path))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
