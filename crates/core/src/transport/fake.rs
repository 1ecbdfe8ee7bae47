//! Fake transport for unit testing call correlation and signal dispatch.
//!
//! Provides an in-memory transport for exercising the client without a
//! running installer service. Replies can be injected by hand or produced
//! by a responder closure that sees every captured call.
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new()
//!     .with_responder(|call| Ok(vec![json!(0)]))
//!     .build();
//! let connection = Arc::new(Connection::new(parts));
//! connection.start();
//!
//! let reply = connection
//!     .send_message(INSTALLER_PATH, INSTALLER_INTERFACE, "GetStatus", vec![])
//!     .await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dinstaller_protocol::{Call, ErrorPayload, Reply, Signal};
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, mpsc};

use super::{Transport, TransportParts, TransportReceiver};
use crate::{Error, Result};

type Answer = std::result::Result<Vec<JsonValue>, ErrorPayload>;
type Responder = Arc<dyn Fn(&Call) -> Answer + Send + Sync>;

/// Builder for creating fake transport instances.
#[derive(Default)]
pub struct FakeTransportBuilder {
    responder: Option<Responder>,
    fail_sends: bool,
}

impl FakeTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every captured call with the closure's result.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&Call) -> std::result::Result<Vec<JsonValue>, ErrorPayload> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Makes every send fail as if the peer were unreachable.
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// Build the fake transport and return both parts and a controller.
    ///
    /// Returns [`TransportParts`] for creating a [`Connection`] and a
    /// [`FakeTransportController`] for injecting replies and inspecting sent messages.
    ///
    /// [`Connection`]: crate::connection::Connection
    pub fn build(self) -> (TransportParts, FakeTransportController) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let sent_messages = Arc::new(Mutex::new(Vec::new()));

        let sender = FakeTransportSender {
            sent: Arc::clone(&sent_messages),
            inbound_tx: inbound_tx.downgrade(),
            responder: self.responder,
            fail_sends: self.fail_sends,
        };

        let receiver = FakeTransportReceiver { inbound_rx, message_tx };

        let controller = FakeTransportController {
            inbound_tx,
            sent: sent_messages,
        };

        let parts = TransportParts {
            sender: Box::new(sender),
            receiver: Box::new(receiver),
            message_rx,
        };

        (parts, controller)
    }
}

/// Controller for injecting replies/signals and inspecting sent messages.
#[derive(Clone)]
pub struct FakeTransportController {
    inbound_tx: mpsc::UnboundedSender<JsonValue>,
    sent: Arc<Mutex<Vec<JsonValue>>>,
}

impl FakeTransportController {
    /// Inject a raw JSON message into the connection.
    pub fn inject(&self, message: JsonValue) {
        let _ = self.inbound_tx.send(message);
    }

    /// Inject a successful reply for request `id`.
    pub fn inject_reply(&self, id: u32, reply: Vec<JsonValue>) {
        self.inject_message(&Reply::success(id, reply));
    }

    /// Inject an error reply for request `id`.
    pub fn inject_error(&self, id: u32, name: &str, message: &str) {
        self.inject_message(&Reply::failure(id, name, message));
    }

    /// Inject a signal.
    pub fn inject_signal(&self, path: &str, interface: &str, signal: &str, args: Vec<JsonValue>) {
        self.inject_message(&Signal {
            path: path.to_string(),
            interface: interface.to_string(),
            signal: signal.to_string(),
            args,
        });
    }

    /// Close the inbound side, ending the connection loop once no clone remains.
    pub fn close(self) {
        drop(self.inbound_tx);
    }

    /// Take all sent messages, clearing the buffer.
    pub async fn take_sent(&self) -> Vec<JsonValue> {
        std::mem::take(&mut *self.sent.lock().await)
    }

    /// Sent messages that parse as calls, without clearing the buffer.
    pub async fn sent_calls(&self) -> Vec<Call> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|message| serde_json::from_value(message.clone()).ok())
            .collect()
    }

    fn inject_message<T: serde::Serialize>(&self, message: &T) {
        if let Ok(value) = serde_json::to_value(message) {
            self.inject(value);
        }
    }
}

struct FakeTransportSender {
    sent: Arc<Mutex<Vec<JsonValue>>>,
    // Weak so that dropping the controller ends the connection loop.
    inbound_tx: mpsc::WeakUnboundedSender<JsonValue>,
    responder: Option<Responder>,
    fail_sends: bool,
}

impl Transport for FakeTransportSender {
    fn send(
        &mut self,
        message: JsonValue,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.fail_sends {
                return Err(Error::Transport("fake transport refused to send".into()));
            }

            let reply = match (&self.responder, serde_json::from_value::<Call>(message.clone())) {
                (Some(responder), Ok(call)) => Some(match responder(&call) {
                    Ok(reply) => Reply::success(call.id, reply),
                    Err(error) => Reply::failure(call.id, error.name, error.message),
                }),
                _ => None,
            };

            self.sent.lock().await.push(message);

            if let (Some(reply), Some(inbound_tx)) = (reply, self.inbound_tx.upgrade()) {
                let _ = inbound_tx.send(serde_json::to_value(reply)?);
            }
            Ok(())
        })
    }
}

struct FakeTransportReceiver {
    inbound_rx: mpsc::UnboundedReceiver<JsonValue>,
    message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for FakeTransportReceiver {
    fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move {
            while let Some(message) = self.inbound_rx.recv().await {
                if self.message_tx.send(message).is_err() {
                    break;
                }
            }
            Ok(())
        })
    }
}
