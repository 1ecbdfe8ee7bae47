//! WebSocket transport carrying one JSON message per text frame.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Transport, TransportParts, TransportReceiver};
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection to the installer bus bridge.
pub struct WebSocketTransport {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl WebSocketTransport {
    /// Connects to `url` and returns the transport plus its inbound message channel.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<JsonValue>)> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(format!("failed to connect to {url}: {e}")))?;
        tracing::debug!(target = "dinstaller.client", %url, "websocket connected");

        let (sink, stream) = ws.split();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        Ok((Self { sink, stream, message_tx }, message_rx))
    }

    pub fn into_transport_parts(
        self,
        message_rx: mpsc::UnboundedReceiver<JsonValue>,
    ) -> TransportParts {
        TransportParts {
            sender: Box::new(WebSocketSender { sink: self.sink }),
            receiver: Box::new(WebSocketReceiver {
                stream: self.stream,
                message_tx: self.message_tx,
            }),
            message_rx,
        }
    }
}

struct WebSocketSender {
    sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketSender {
    fn send(
        &mut self,
        message: JsonValue,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let text = serde_json::to_string(&message)?;
            self.sink
                .send(Message::Text(text.into()))
                .await
                .map_err(|e| Error::WebSocket(e.to_string()))
        })
    }
}

struct WebSocketReceiver {
    stream: SplitStream<WsStream>,
    message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for WebSocketReceiver {
    fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            while let Some(frame) = self.stream.next().await {
                let frame = frame.map_err(|e| Error::WebSocket(e.to_string()))?;
                let parsed = match frame {
                    Message::Text(text) => serde_json::from_str::<JsonValue>(&text),
                    Message::Binary(bytes) => serde_json::from_slice::<JsonValue>(&bytes),
                    Message::Close(_) => break,
                    _ => continue,
                };
                match parsed {
                    Ok(message) => {
                        if self.message_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(
                        target = "dinstaller.client",
                        error = %e,
                        "dropping malformed frame"
                    ),
                }
            }
            Ok(())
        })
    }
}
