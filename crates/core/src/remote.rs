//! Method calls and property access on a remote object.

use std::sync::Arc;

use dinstaller_protocol::names::{self, property};
use dinstaller_protocol::{FromVariant, IntoVariant, OptionValue, Signal, Variant};
use serde_json::Value;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::signal::Subscription;

/// Client for one object path / interface pair.
#[derive(Clone)]
pub struct RemoteObject {
    connection: Arc<Connection>,
    path: String,
    interface: String,
}

impl RemoteObject {
    pub fn new(
        connection: Arc<Connection>,
        path: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            path: path.into(),
            interface: interface.into(),
        }
    }

    /// The installer object at its well-known path.
    pub fn installer(connection: Arc<Connection>) -> Self {
        Self::new(connection, names::INSTALLER_PATH, names::INSTALLER_INTERFACE)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Invokes `method` and returns the reply payload.
    ///
    /// Failures propagate unchanged and the call is never retried.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        self.connection.send_message(&self.path, &self.interface, method, args).await
    }

    /// Reads option `name`.
    ///
    /// Best effort: any failure is logged and reported as `None`.
    pub async fn get_option(&self, name: &str) -> Option<OptionValue> {
        match self.read_property(name).await {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!(
                    target = "dinstaller.client",
                    option = %name,
                    error = %err,
                    "Error getting option \"{}\"",
                    name
                );
                None
            }
        }
    }

    /// Reads option `name` as `T`; a value of another type is logged and reported as `None`.
    pub async fn get_option_as<T: FromVariant>(&self, name: &str) -> Option<T> {
        let value = self.get_option(name).await?;
        let tag = value.tag().to_string();
        let typed = T::from_option_value(value);
        if typed.is_none() {
            tracing::warn!(
                target = "dinstaller.client",
                option = %name,
                %tag,
                "option has an unexpected type"
            );
        }
        typed
    }

    /// Writes option `name`. Failures propagate to the caller.
    pub async fn set_option(&self, name: &str, value: impl IntoVariant) -> Result<()> {
        let variant = serde_json::to_value(value.into_variant())?;
        let args = vec![Value::from(self.interface.as_str()), Value::from(name), variant];
        self.connection
            .send_message(&self.path, names::PROPERTIES_INTERFACE, property::SET, args)
            .await?;
        tracing::debug!(target = "dinstaller.client", option = %name, "option set");
        Ok(())
    }

    /// Registers `handler` for `signal` emitted by this object.
    pub fn subscribe<F>(&self, signal: &str, handler: F) -> Subscription
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        self.connection.subscribe(&self.path, &self.interface, signal, handler)
    }

    async fn read_property(&self, name: &str) -> Result<OptionValue> {
        let args = vec![Value::from(self.interface.as_str()), Value::from(name)];
        let reply = self
            .connection
            .send_message(&self.path, names::PROPERTIES_INTERFACE, property::GET, args)
            .await?;
        let first = reply
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnexpectedReply(format!("empty reply reading {name}")))?;
        let variant: Variant = serde_json::from_value(first)?;
        Ok(variant.decode())
    }
}
