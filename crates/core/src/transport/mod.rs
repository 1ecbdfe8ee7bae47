//! Transport abstraction under the [`Connection`](crate::connection::Connection).
//!
//! A transport is split into a sending half, a receiving loop, and the
//! channel the receiving loop feeds with parsed JSON messages. Framing and
//! connection setup belong to the concrete transport.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use crate::Result;

pub mod fake;
pub mod memory;
pub mod websocket;

pub use fake::{FakeTransportBuilder, FakeTransportController};
pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

/// Sending half of a transport.
pub trait Transport: Send + Sync {
    fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Receiving loop of a transport; forwards inbound messages until the peer goes away.
pub trait TransportReceiver: Send {
    fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Everything a [`Connection`](crate::connection::Connection) needs from a transport.
pub struct TransportParts {
    pub sender: Box<dyn Transport>,
    pub receiver: Box<dyn TransportReceiver>,
    pub message_rx: mpsc::UnboundedReceiver<JsonValue>,
}
