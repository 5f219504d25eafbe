// relay-server/src/dispatch.rs
use common::{iso_timestamp, RelayMessage};
use serde_json::Value;

use crate::registry::{ConnectionRegistry, SocketError};

/// Why a frame could not be delivered to a client
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("client {0} not found")]
    NotFound(String),
    #[error("client {0} is not in open state")]
    NotOpen(String),
    #[error("failed to send to client {client_id}: {source}")]
    Write {
        client_id: String,
        #[source]
        source: SocketError,
    },
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A frame ready to be pushed to a client
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Already serialized, sent byte for byte
    Raw(String),
    /// Encoded as JSON with a fresh `timestamp`
    Structured(Value),
}

impl Outbound {
    fn encode(self) -> Result<String, serde_json::Error> {
        match self {
            Outbound::Raw(text) => Ok(text),
            Outbound::Structured(mut value) => {
                if let Value::Object(map) = &mut value {
                    map.insert("timestamp".to_string(), Value::String(iso_timestamp()));
                }
                serde_json::to_string(&value)
            }
        }
    }
}

impl From<String> for Outbound {
    fn from(text: String) -> Self {
        Outbound::Raw(text)
    }
}

impl From<Value> for Outbound {
    fn from(value: Value) -> Self {
        Outbound::Structured(value)
    }
}

impl TryFrom<&RelayMessage> for Outbound {
    type Error = serde_json::Error;

    fn try_from(message: &RelayMessage) -> Result<Self, Self::Error> {
        serde_json::to_value(message).map(Outbound::Structured)
    }
}

/// Push one frame to the connection registered under `client_id`.
///
/// Makes a single attempt. A connection found closed, or whose write
/// fails, is evicted from the registry before the error is returned.
pub fn dispatch(
    registry: &ConnectionRegistry,
    client_id: &str,
    message: impl Into<Outbound>,
) -> Result<(), DispatchError> {
    let connection = match registry.find(client_id) {
        Some(connection) => connection,
        None => {
            tracing::warn!("Client with ID {} not found", client_id);
            return Err(DispatchError::NotFound(client_id.to_string()));
        }
    };

    if !connection.socket.is_open() {
        tracing::warn!("Client {} is not in OPEN state, evicting", client_id);
        registry.unregister(client_id);
        return Err(DispatchError::NotOpen(client_id.to_string()));
    }

    let text = message.into().encode()?;

    match connection.socket.send_text(text.clone()) {
        Ok(()) => {
            tracing::info!("Message sent to client {}", client_id);
            tracing::debug!("Payload for client {}: {}", client_id, text);
            Ok(())
        }
        Err(source) => {
            tracing::error!("Error sending message to client {}: {}", client_id, source);
            registry.unregister(client_id);
            Err(DispatchError::Write {
                client_id: client_id.to_string(),
                source,
            })
        }
    }
}
