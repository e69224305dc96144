//! Relay channel error types

use thiserror::Error;

/// Errors from the relay channel.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The channel closed. All peer sessions must be torn down; the
    /// embedding client decides when to reconnect.
    #[error("relay channel disconnected")]
    Disconnected,
}
