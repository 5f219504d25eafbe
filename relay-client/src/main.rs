// relay-client/src/main.rs
use common::{frame_type, greeted_client_id, setup_tracing, Config, Side};
use relay_client::{ConnectionManager, ReconnectPolicy};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config = Config::from_env();
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.ws_url(Side::Browser).to_string());

    tracing::info!("Connecting to relay at {}", url);
    tracing::info!("Webhooks for this client go to {}", config.webhook_url(Side::Browser));

    let manager = ConnectionManager::spawn(&url, ReconnectPolicy::from(&config.reconnect))?;
    let mut messages = manager.subscribe();
    let mut state = manager.watch_state();
    manager.connect();

    loop {
        tokio::select! {
            received = messages.recv() => match received {
                Ok(message) => match greeted_client_id(&message) {
                    Some(client_id) => tracing::info!("Client ID: {}", client_id),
                    None => tracing::info!(
                        "{} message: {}",
                        frame_type(&message).unwrap_or("untyped"),
                        message
                    ),
                },
                Err(RecvError::Lagged(n)) => tracing::warn!("Skipped {} messages", n),
                Err(RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!("Connection state: {:?}", current);
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                manager.disconnect();
                break;
            },
        }
    }

    // Give the close frame a moment to go out
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    Ok(())
}
