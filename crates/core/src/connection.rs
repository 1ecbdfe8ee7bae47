//! Call/reply correlation and signal dispatch on top of a transport.
//!
//! This module handles:
//! - Generating unique request IDs
//! - Correlating replies with pending calls
//! - Distinguishing signals from replies
//! - Dispatching signals to registered handlers
//!
//! # Message Flow
//!
//! 1. Caller invokes `send_message()` with path, interface, method and args
//! 2. Connection generates a unique ID and creates a oneshot channel
//! 3. The call is serialized and sent via the transport, exactly once
//! 4. Caller awaits the oneshot receiver
//! 5. The message loop receives the reply from the transport
//! 6. The reply is correlated by ID and sent through the oneshot channel
//! 7. Caller receives the reply payload
//!
//! Signals are handled by the same loop, one at a time and in arrival order,
//! so handlers observe them in the order the service emitted them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dinstaller_protocol::{Call, ErrorPayload, Message, Signal};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::signal::{SignalMatch, SignalRegistry, Subscription};
use crate::transport::{Transport, TransportParts, TransportReceiver};

type PendingReply = oneshot::Sender<Result<Vec<Value>>>;

/// Bus connection to the installer service.
///
/// Thread-safe; share it across tasks with `Arc`. Multiple concurrent calls
/// are supported.
///
/// Calls are never retried: a call the transport fails to deliver returns the
/// transport error, since installer methods must not run twice.
pub struct Connection {
    /// Sequential request ID counter
    last_id: AtomicU32,
    /// Pending reply channels keyed by request ID
    callbacks: Arc<Mutex<HashMap<u32, PendingReply>>>,
    sender: Mutex<Box<dyn Transport>>,
    receiver: parking_lot::Mutex<Option<Box<dyn TransportReceiver>>>,
    message_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    signals: Arc<SignalRegistry>,
    request_timeout: Option<Duration>,
}

impl Connection {
    pub fn new(parts: TransportParts) -> Self {
        Self {
            last_id: AtomicU32::new(0),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            sender: Mutex::new(parts.sender),
            receiver: parking_lot::Mutex::new(Some(parts.receiver)),
            message_rx: parking_lot::Mutex::new(Some(parts.message_rx)),
            signals: Arc::new(SignalRegistry::default()),
            request_timeout: None,
        }
    }

    /// Bounds how long a call waits for its reply.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let connection = Arc::clone(self);
        tokio::spawn(async move { connection.run().await })
    }

    /// Send a call and await its reply payload.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The transport fails to send the call
    /// - The remote object answers with an error
    /// - The connection closes or the request timeout elapses before the reply arrives
    pub async fn send_message(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.callbacks.lock().await.insert(id, tx);

        let call = Call {
            id,
            path: path.to_string(),
            interface: interface.to_string(),
            method: method.to_string(),
            args,
        };
        tracing::trace!(
            target = "dinstaller.client",
            id,
            %path,
            %interface,
            %method,
            "sending call"
        );

        let sent = match serde_json::to_value(&call) {
            Ok(value) => self.sender.lock().await.send(value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            self.callbacks.lock().await.remove(&id);
            return Err(e);
        }

        let reply = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.callbacks.lock().await.remove(&id);
                    return Err(Error::Timeout(format!("{interface}.{method}")));
                }
            },
            None => rx.await,
        };

        reply.map_err(|_| Error::ChannelClosed).and_then(|result| result)
    }

    /// Registers `handler` for signals matching path, interface and name.
    pub fn subscribe<F>(
        &self,
        path: &str,
        interface: &str,
        signal: &str,
        handler: F,
    ) -> Subscription
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        let rule = SignalMatch {
            path: path.to_string(),
            interface: interface.to_string(),
            signal: signal.to_string(),
        };
        self.signals.subscribe(rule, Arc::new(handler))
    }

    /// Run the message dispatch loop until the transport closes.
    ///
    /// Calls still waiting for a reply when the loop ends fail with
    /// [`Error::ChannelClosed`]. Only the first invocation runs; later ones return at once.
    pub async fn run(&self) {
        let receiver = self.receiver.lock().take();
        let message_rx = self.message_rx.lock().take();
        let (Some(receiver), Some(mut message_rx)) = (receiver, message_rx) else {
            tracing::warn!(target = "dinstaller.client", "connection loop already started");
            return;
        };

        let transport_handle = tokio::spawn(async move {
            if let Err(e) = receiver.run().await {
                tracing::error!(target = "dinstaller.client", error = %e, "transport error");
            }
        });

        while let Some(message_value) = message_rx.recv().await {
            match serde_json::from_value::<Message>(message_value.clone()) {
                Ok(message) => {
                    if let Err(e) = self.dispatch(message).await {
                        tracing::error!(
                            target = "dinstaller.client",
                            error = %e,
                            "error dispatching message"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        target = "dinstaller.client",
                        error = %e,
                        message = %message_value,
                        "failed to parse message"
                    );
                }
            }
        }

        tracing::debug!(target = "dinstaller.client", "message loop ended (transport closed)");
        self.callbacks.lock().await.clear();

        let _ = transport_handle.await;
    }

    async fn dispatch(&self, message: Message) -> Result<()> {
        match message {
            Message::Reply(reply) => {
                let id = reply.id;
                let callback = self.callbacks.lock().await.remove(&id).ok_or_else(|| {
                    Error::UnexpectedReply(format!("Cannot find request to respond: id={id}"))
                })?;

                let result = match reply.error {
                    Some(error) => Err(remote_error(error)),
                    None => Ok(reply.reply.unwrap_or_default()),
                };

                // Receiver may have given up (timeout); nothing to do then.
                let _ = callback.send(result);
                Ok(())
            }
            Message::Signal(signal) => {
                let delivered = self.signals.emit(&signal);
                tracing::trace!(
                    target = "dinstaller.client",
                    signal = %signal.signal,
                    delivered,
                    "signal dispatched"
                );
                Ok(())
            }
            Message::Call(call) => {
                tracing::debug!(
                    target = "dinstaller.client",
                    method = %call.method,
                    "ignoring inbound call"
                );
                Ok(())
            }
        }
    }
}

fn remote_error(error: ErrorPayload) -> Error {
    Error::Remote {
        name: error.name,
        message: error.message,
    }
}

#[cfg(test)]
mod tests {
    use dinstaller_protocol::{Reply, names};
    use serde_json::json;

    use super::*;
    use crate::transport::{FakeTransportBuilder, FakeTransportController};

    fn create_test_connection() -> (Arc<Connection>, FakeTransportController) {
        let (parts, controller) = FakeTransportBuilder::new().build();
        (Arc::new(Connection::new(parts)), controller)
    }

    fn spawn_call(
        connection: &Arc<Connection>,
        path: &'static str,
        method: &'static str,
    ) -> tokio::task::JoinHandle<Result<Vec<Value>>> {
        let connection = Arc::clone(connection);
        tokio::spawn(async move { connection.send_message(path, "i", method, vec![]).await })
    }

    #[test]
    fn test_request_id_increments() {
        let (connection, _controller) = create_test_connection();

        let id1 = connection.last_id.fetch_add(1, Ordering::SeqCst);
        let id2 = connection.last_id.fetch_add(1, Ordering::SeqCst);

        assert_eq!(id1, 0);
        assert_eq!(id2, 1);
    }

    #[tokio::test]
    async fn test_dispatch_reply_success() {
        let (connection, _controller) = create_test_connection();

        let (tx, rx) = oneshot::channel();
        connection.callbacks.lock().await.insert(0, tx);

        connection.dispatch(Message::Reply(Reply::success(0, vec![json!(3)]))).await.unwrap();

        assert_eq!(rx.await.unwrap().unwrap(), vec![json!(3)]);
    }

    #[tokio::test]
    async fn test_dispatch_reply_error() {
        let (connection, _controller) = create_test_connection();

        let (tx, rx) = oneshot::channel();
        connection.callbacks.lock().await.insert(0, tx);

        let reply = Reply::failure(0, names::error::UNKNOWN_PROPERTY, "no such property");
        connection.dispatch(Message::Reply(reply)).await.unwrap();

        match rx.await.unwrap().unwrap_err() {
            Error::Remote { name, message } => {
                assert_eq!(name, names::error::UNKNOWN_PROPERTY);
                assert_eq!(message, "no such property");
            }
            other => panic!("Expected Remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_invalid_id() {
        let (connection, _controller) = create_test_connection();

        let result = connection.dispatch(Message::Reply(Reply::success(999, vec![]))).await;
        match result.unwrap_err() {
            Error::UnexpectedReply(msg) => assert!(msg.contains("Cannot find request")),
            other => panic!("Expected UnexpectedReply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replies_correlate_out_of_order() {
        let (connection, controller) = create_test_connection();
        connection.start();

        let fut1 = spawn_call(&connection, "/a", "First");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let fut2 = spawn_call(&connection, "/b", "Second");
        tokio::time::sleep(Duration::from_millis(10)).await;

        controller.inject_reply(1, vec![json!("second")]);
        controller.inject_reply(0, vec![json!("first")]);

        assert_eq!(fut1.await.unwrap().unwrap(), vec![json!("first")]);
        assert_eq!(fut2.await.unwrap().unwrap(), vec![json!("second")]);
    }

    #[tokio::test]
    async fn test_injected_error_fails_only_its_call() {
        let (connection, controller) = create_test_connection();
        connection.start();

        let fut1 = spawn_call(&connection, "/a", "First");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let fut2 = spawn_call(&connection, "/b", "Second");
        tokio::time::sleep(Duration::from_millis(10)).await;

        controller.inject_error(0, "org.freedesktop.DBus.Error.Failed", "No Product Available");
        controller.inject_reply(1, vec![json!(0)]);

        match fut1.await.unwrap().unwrap_err() {
            Error::Remote { name, message } => {
                assert_eq!(name, "org.freedesktop.DBus.Error.Failed");
                assert_eq!(message, "No Product Available");
            }
            other => panic!("Expected Remote error, got {other:?}"),
        }
        assert_eq!(fut2.await.unwrap().unwrap(), vec![json!(0)]);
    }

    #[tokio::test]
    async fn test_call_wire_format() {
        let (parts, controller) = FakeTransportBuilder::new()
            .with_responder(|_| Ok(vec![]))
            .build();
        let connection = Arc::new(Connection::new(parts));
        connection.start();

        connection
            .send_message(names::INSTALLER_PATH, names::INSTALLER_INTERFACE, "Start", vec![])
            .await
            .unwrap();

        let sent = controller.take_sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["id"], 0);
        assert_eq!(sent[0]["path"], names::INSTALLER_PATH);
        assert_eq!(sent[0]["interface"], names::INSTALLER_INTERFACE);
        assert_eq!(sent[0]["method"], "Start");
        assert_eq!(sent[0]["args"], json!([]));
    }

    #[tokio::test]
    async fn test_failed_send_is_not_retried() {
        let (parts, controller) = FakeTransportBuilder::new().failing_sends().build();
        let connection = Arc::new(Connection::new(parts));
        connection.start();

        let err = connection.send_message("/p", "i", "Start", vec![]).await.unwrap_err();
        assert!(err.is_transport());
        assert!(controller.take_sent().await.is_empty());
        assert!(connection.callbacks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_drops_pending_call() {
        let (parts, _controller) = FakeTransportBuilder::new().build();
        let timeout = Some(Duration::from_millis(20));
        let connection = Arc::new(Connection::new(parts).with_request_timeout(timeout));
        connection.start();

        let err = connection.send_message("/p", "i", "GetStatus", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(ref what) if what == "i.GetStatus"));
        assert!(connection.callbacks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_call_fails_when_transport_closes() {
        let (connection, controller) = create_test_connection();
        let loop_handle = connection.start();

        let pending = spawn_call(&connection, "/p", "GetStatus");
        tokio::time::sleep(Duration::from_millis(10)).await;

        controller.close();
        loop_handle.await.unwrap();

        assert!(matches!(pending.await.unwrap(), Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_signals_dispatch_in_arrival_order() {
        let (connection, controller) = create_test_connection();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = connection.subscribe("/p", "i", "Changed", move |signal| {
            let _ = tx.send(signal.args[0].clone());
        });
        connection.start();

        for n in 0..5 {
            controller.inject_signal("/p", "i", "Changed", vec![json!(n)]);
        }
        controller.inject_signal("/other", "i", "Changed", vec![json!(99)]);

        for n in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), json!(n));
        }
        assert!(tokio::time::timeout(Duration::from_millis(20), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_second_run_returns_immediately() {
        let (connection, _controller) = create_test_connection();
        connection.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        tokio::time::timeout(Duration::from_millis(100), connection.run())
            .await
            .expect("second run should not block");
    }
}
