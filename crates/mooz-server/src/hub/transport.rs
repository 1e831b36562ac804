//! Transport seam between a session and its connection.
//!
//! Sessions only see [`MessageReader`] and [`MessageWriter`]; the axum
//! WebSocket halves implement them here. Frames are single JSON-encoded
//! [`Message`]s, sent as text.

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use mooz_core::{Message, TransportError};
use tracing::trace;

/// Inbound half of a connection.
#[async_trait]
pub trait MessageReader: Send + 'static {
    /// Wait for the next message.
    ///
    /// Must be cancel-safe: dropping the future before it resolves must not
    /// lose a message. Any error ends the session.
    async fn receive(&mut self) -> Result<Message, TransportError>;
}

/// Outbound half of a connection.
#[async_trait]
pub trait MessageWriter: Send + 'static {
    /// Send one message.
    async fn send(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Close the connection. Called once, when the writer role stops.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Split an upgraded socket into hub transport halves.
pub fn split_socket(socket: WebSocket) -> (WsReader, WsWriter) {
    let (sink, stream) = socket.split();
    (WsReader(stream), WsWriter(sink))
}

/// Reading half of an axum WebSocket.
pub struct WsReader(SplitStream<WebSocket>);

/// Writing half of an axum WebSocket.
pub struct WsWriter(SplitSink<WebSocket, WsMessage>);

#[async_trait]
impl MessageReader for WsReader {
    async fn receive(&mut self) -> Result<Message, TransportError> {
        loop {
            let frame = match self.0.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                None => return Err(TransportError::Closed),
            };
            match frame {
                WsMessage::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
                // Some clients send JSON in binary frames
                WsMessage::Binary(data) => {
                    let text = std::str::from_utf8(&data).map_err(|_| {
                        TransportError::UnsupportedFrame(format!(
                            "non-UTF-8 binary frame ({} bytes)",
                            data.len()
                        ))
                    })?;
                    return Ok(serde_json::from_str(text)?);
                }
                WsMessage::Close(_) => return Err(TransportError::Closed),
                // Control frames are answered by the WebSocket layer
                WsMessage::Ping(_) | WsMessage::Pong(_) => trace!("control frame"),
            }
        }
    }
}

#[async_trait]
impl MessageWriter for WsWriter {
    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let json = serde_json::to_string(message)?;
        self.0
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
