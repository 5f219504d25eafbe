// relay-server/src/main.rs
use common::{setup_tracing, Config};
use relay_server::{http_server, ws_server, ConnectionRegistry};
use std::net::TcpListener;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Setup tracing
    setup_tracing();

    // Load configuration
    let config = Config::from_env();

    // The one registry shared by the acceptor and the webhook endpoint
    let registry = ConnectionRegistry::new();

    let http_listener = TcpListener::bind(&config.http_addr)?;
    let ws_listener = TcpListener::bind(&config.ws_addr)?;

    tracing::info!("> Ready on http://{}", config.http_addr);
    tracing::info!("> WebSocket server available at ws://{}{}", config.ws_addr, config.ws_path);

    let app = http_server(http_listener, registry.clone())?;
    let relay = ws_server(ws_listener, registry, config)?;

    futures::future::try_join(app, relay).await?;
    Ok(())
}
