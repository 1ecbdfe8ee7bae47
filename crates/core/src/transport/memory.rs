//! Channel-backed transport for talking to an in-process installer object.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use super::{Transport, TransportParts, TransportReceiver};
use crate::{Error, Result};

/// Transport whose peer is the other end of two unbounded channels.
pub struct MemoryTransport;

impl MemoryTransport {
    /// Builds transport parts that write to `outgoing` and read from `incoming`.
    pub fn connect(
        outgoing: mpsc::UnboundedSender<JsonValue>,
        incoming: mpsc::UnboundedReceiver<JsonValue>,
    ) -> TransportParts {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        TransportParts {
            sender: Box::new(MemorySender { outgoing }),
            receiver: Box::new(MemoryReceiver { incoming, message_tx }),
            message_rx,
        }
    }
}

struct MemorySender {
    outgoing: mpsc::UnboundedSender<JsonValue>,
}

impl Transport for MemorySender {
    fn send(
        &mut self,
        message: JsonValue,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let sent = self
            .outgoing
            .send(message)
            .map_err(|_| Error::Transport("peer channel closed".into()));
        Box::pin(async move { sent })
    }
}

struct MemoryReceiver {
    incoming: mpsc::UnboundedReceiver<JsonValue>,
    message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for MemoryReceiver {
    fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            while let Some(message) = self.incoming.recv().await {
                if self.message_tx.send(message).is_err() {
                    break;
                }
            }
            Ok(())
        })
    }
}
