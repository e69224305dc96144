//! Client side of the relay channel

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::protocol::SignalingMessage;

use super::error::RelayError;

/// Connector for the relay server.
pub struct RelayClient {
    server_url: String,
}

impl RelayClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
        }
    }

    /// Open the duplex channel.
    pub async fn connect(&self) -> Result<RelayConnection, RelayError> {
        let (ws_stream, _) = connect_async(&self.server_url).await?;
        debug!("connected to relay at {}", self.server_url);
        Ok(RelayConnection { ws_stream })
    }
}

/// An open channel to the relay server, framing [`SignalingMessage`]s as
/// JSON text frames.
pub struct RelayConnection {
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl RelayConnection {
    /// Send one signaling message.
    pub async fn send(&mut self, message: &SignalingMessage) -> Result<(), RelayError> {
        self.ws_stream
            .send(Message::Text(message.encode()))
            .await?;
        Ok(())
    }

    /// Receive the next signaling message.
    ///
    /// Frames that fail to decode are logged and skipped, never fatal.
    /// A closed channel surfaces as [`RelayError::Disconnected`].
    pub async fn recv(&mut self) -> Result<SignalingMessage, RelayError> {
        loop {
            match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => match SignalingMessage::decode(&text) {
                    Ok(message) => return Ok(message),
                    Err(err) => {
                        warn!("dropping undecodable relay frame: {}", err);
                    }
                },
                Some(Ok(Message::Close(_))) | None => return Err(RelayError::Disconnected),
                Some(Ok(_)) => {} // ping/pong/binary
                Some(Err(err)) => return Err(RelayError::Transport(err)),
            }
        }
    }

    /// Close the channel.
    pub async fn close(mut self) -> Result<(), RelayError> {
        self.ws_stream.close(None).await?;
        Ok(())
    }
}
