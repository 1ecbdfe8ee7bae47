//! Installer status queries and change notifications.

use dinstaller_protocol::InstallerStatus;
use dinstaller_protocol::names::{method, signal};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::remote::RemoteObject;
use crate::signal::Subscription;

/// Reads the installer status and follows its transitions.
#[derive(Clone)]
pub struct StatusWatcher {
    object: RemoteObject,
}

impl StatusWatcher {
    pub fn new(object: RemoteObject) -> Self {
        Self { object }
    }

    /// Current status; the first reply element is the status code.
    pub async fn get_status(&self) -> Result<InstallerStatus> {
        let reply = self.object.call(method::GET_STATUS, vec![]).await?;
        status_from_args(&reply)
    }

    /// Like [`get_status`](Self::get_status), but logs failures and reports idle.
    pub async fn status_or_idle(&self) -> InstallerStatus {
        self.get_status().await.unwrap_or_else(|err| {
            tracing::error!(
                target = "dinstaller.client",
                error = %err,
                "Error getting installer status"
            );
            InstallerStatus::IDLE
        })
    }

    /// Calls `handler` for every subsequent status change, in emission order.
    ///
    /// The handler runs on the connection task, concurrently with in-flight calls.
    pub fn on_status_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(InstallerStatus) + Send + Sync + 'static,
    {
        self.object.subscribe(signal::STATUS_CHANGED, move |signal| {
            match status_from_args(&signal.args) {
                Ok(status) => handler(status),
                Err(err) => tracing::warn!(
                    target = "dinstaller.client",
                    error = %err,
                    "ignoring malformed StatusChanged signal"
                ),
            }
        })
    }

    /// Status changes as an async stream.
    pub fn watch(&self) -> StatusStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.on_status_changed(move |status| {
            let _ = tx.send(status);
        });
        StatusStream { rx, subscription }
    }
}

/// Stream of status transitions backed by a [`Subscription`].
#[derive(Debug)]
pub struct StatusStream {
    rx: mpsc::UnboundedReceiver<InstallerStatus>,
    subscription: Subscription,
}

impl StatusStream {
    /// Next transition; `None` once unsubscribed and drained.
    pub async fn next(&mut self) -> Option<InstallerStatus> {
        self.rx.recv().await
    }

    pub fn unsubscribe(&mut self) {
        self.subscription.unsubscribe();
        self.rx.close();
    }
}

fn status_from_args(args: &[Value]) -> Result<InstallerStatus> {
    args.first()
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .map(InstallerStatus::from_code)
        .ok_or_else(|| Error::UnexpectedReply(format!("expected an int32 status, got {args:?}")))
}
