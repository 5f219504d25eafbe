// relay-client/src/error.rs

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid relay URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("WebSocket is not connected")]
    NotConnected,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection manager has stopped")]
    Stopped,
}
