//! The installer object as seen over the bus.
//!
//! [`InstallerObject`] answers the calls a client sends to
//! `/org/opensuse/YaST/Installer` by delegating to the [`Orchestrator`],
//! a [`SystemInfo`] provider and an in-memory option store. [`serve`]
//! drives it over a pair of JSON message channels and turns status
//! transitions into `StatusChanged` signals.

use std::collections::BTreeMap;
use std::sync::Arc;

use dinstaller_protocol::names::{self, error as bus_error, method, property};
use dinstaller_protocol::{
    Call, Disk, InstallerStatus, LanguageMap, MountAssignment, Reply, Signal, Variant,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;
use crate::progress::TracingSink;

/// Locale and storage facts about the machine being installed.
pub trait SystemInfo: Send + Sync + 'static {
    /// Languages keyed by code: `[code, native name, encoding, territory, English name]`.
    fn languages(&self) -> LanguageMap;

    fn disks(&self) -> Vec<Disk>;

    /// Proposed mount plan, in mount order.
    fn storage_proposal(&self) -> Vec<MountAssignment>;
}

/// [`SystemInfo`] backed by fixed data.
#[derive(Debug, Clone, Default)]
pub struct StaticSystemInfo {
    pub languages: LanguageMap,
    pub disks: Vec<Disk>,
    pub storage: Vec<MountAssignment>,
}

impl SystemInfo for StaticSystemInfo {
    fn languages(&self) -> LanguageMap {
        self.languages.clone()
    }

    fn disks(&self) -> Vec<Disk> {
        self.disks.clone()
    }

    fn storage_proposal(&self) -> Vec<MountAssignment> {
        self.storage.clone()
    }
}

/// Bus-level failure: a D-Bus style error name plus a message.
struct CallError {
    name: &'static str,
    message: String,
}

impl CallError {
    fn new(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            message: message.into(),
        }
    }
}

impl From<OrchestratorError> for CallError {
    fn from(err: OrchestratorError) -> Self {
        let name = match err {
            OrchestratorError::InvalidSelection(_) => bus_error::INVALID_ARGS,
            _ => bus_error::FAILED,
        };
        Self::new(name, err.to_string())
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(bus_error::FAILED, err.to_string())
    }
}

type CallResult = std::result::Result<Vec<Value>, CallError>;

pub struct InstallerObject {
    orchestrator: Arc<Orchestrator>,
    system: Arc<dyn SystemInfo>,
    options: Mutex<BTreeMap<String, Variant>>,
}

impl InstallerObject {
    pub fn new(orchestrator: Arc<Orchestrator>, system: Arc<dyn SystemInfo>) -> Self {
        Self {
            orchestrator,
            system,
            options: Mutex::new(BTreeMap::new()),
        }
    }

    /// Seeds option `name`; only seeded options can be read or written.
    pub fn with_option(self, name: impl Into<String>, value: Variant) -> Self {
        self.options.lock().insert(name.into(), value);
        self
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn option(&self, name: &str) -> Option<Variant> {
        self.options.lock().get(name).cloned()
    }

    /// Answers one call.
    pub async fn handle_call(&self, call: &Call) -> Reply {
        debug!(
            target = "dinstaller.orchestrator",
            id = call.id,
            interface = %call.interface,
            method = %call.method,
            "handling call"
        );
        let result = if call.path != names::INSTALLER_PATH {
            Err(CallError::new(bus_error::UNKNOWN_OBJECT, format!("No object at {}", call.path)))
        } else if call.interface == names::INSTALLER_INTERFACE {
            self.installer_method(call).await
        } else if call.interface == names::PROPERTIES_INTERFACE {
            self.property_method(call)
        } else {
            Err(unknown_interface(&call.interface))
        };

        match result {
            Ok(values) => Reply::success(call.id, values),
            Err(err) => {
                warn!(
                    target = "dinstaller.orchestrator",
                    method = %call.method,
                    error = %err.message,
                    "call failed"
                );
                Reply::failure(call.id, err.name, err.message)
            }
        }
    }

    async fn installer_method(&self, call: &Call) -> CallResult {
        match call.method.as_str() {
            method::GET_STATUS => Ok(vec![Value::from(self.orchestrator.status().code())]),
            method::GET_PRODUCTS => single(&self.orchestrator.products()),
            method::SELECT_PRODUCT => {
                let name = string_arg(call, 0)?;
                self.orchestrator.select_product(name).await?;
                self.orchestrator.propose().await?;
                Ok(Vec::new())
            }
            method::GET_LANGUAGES => single(&self.system.languages()),
            method::GET_DISKS => single(&self.system.disks()),
            method::GET_STORAGE => single(&self.system.storage_proposal()),
            method::START => {
                self.start()?;
                Ok(Vec::new())
            }
            other => Err(unknown_method(other)),
        }
    }

    /// Claims the install slot, then runs the install in the background.
    fn start(&self) -> Result<(), OrchestratorError> {
        let guard = self.orchestrator.begin_install()?;

        info!(target = "dinstaller.orchestrator", "Starting installation");
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            if let Err(err) = orchestrator.install_with_guard(guard, TracingSink).await {
                error!(
                    target = "dinstaller.orchestrator",
                    error = %err,
                    "background installation failed"
                );
            }
        });
        Ok(())
    }

    fn property_method(&self, call: &Call) -> CallResult {
        let interface = string_arg(call, 0)?;
        if interface != names::INSTALLER_INTERFACE {
            return Err(unknown_interface(interface));
        }
        let name = string_arg(call, 1)?;

        match call.method.as_str() {
            property::GET => {
                let value = self.option(name).ok_or_else(|| unknown_property(name))?;
                single(&value)
            }
            property::SET => {
                let raw = call
                    .args
                    .get(2)
                    .cloned()
                    .ok_or_else(|| CallError::new(bus_error::INVALID_ARGS, "Missing value"))?;
                let value: Variant = serde_json::from_value(raw).map_err(|err| {
                    let message = format!("Invalid value for {name}: {err}");
                    CallError::new(bus_error::INVALID_ARGS, message)
                })?;

                let mut options = self.options.lock();
                let slot = options.get_mut(name).ok_or_else(|| unknown_property(name))?;
                info!(
                    target = "dinstaller.orchestrator",
                    option = %name,
                    value = %value.value,
                    "option changed"
                );
                *slot = value;
                Ok(Vec::new())
            }
            other => Err(unknown_method(other)),
        }
    }
}

fn single<T: Serialize + ?Sized>(value: &T) -> CallResult {
    Ok(vec![serde_json::to_value(value)?])
}

fn string_arg(call: &Call, index: usize) -> Result<&str, CallError> {
    call.args.get(index).and_then(Value::as_str).ok_or_else(|| {
        let message = format!("{} expects a string argument at {index}", call.method);
        CallError::new(bus_error::INVALID_ARGS, message)
    })
}

fn unknown_interface(interface: &str) -> CallError {
    CallError::new(bus_error::UNKNOWN_INTERFACE, format!("Unknown interface {interface}"))
}

fn unknown_method(method: &str) -> CallError {
    CallError::new(bus_error::UNKNOWN_METHOD, format!("Unknown method {method}"))
}

fn unknown_property(name: &str) -> CallError {
    CallError::new(bus_error::UNKNOWN_PROPERTY, format!("Unknown property {name}"))
}

/// `StatusChanged` signal carrying `status`.
pub fn status_signal(status: InstallerStatus) -> Signal {
    Signal {
        path: names::INSTALLER_PATH.to_string(),
        interface: names::INSTALLER_INTERFACE.to_string(),
        signal: names::signal::STATUS_CHANGED.to_string(),
        args: vec![Value::from(status.code())],
    }
}

/// Serves `object` until `incoming` closes.
///
/// Calls are answered concurrently; status transitions are sent as signals
/// as they happen.
pub async fn serve(
    object: Arc<InstallerObject>,
    mut incoming: mpsc::UnboundedReceiver<Value>,
    outgoing: mpsc::UnboundedSender<Value>,
) {
    let mut status = Some(object.orchestrator.subscribe());

    loop {
        tokio::select! {
            message = incoming.recv() => {
                let Some(message) = message else { break };
                let call: Call = match serde_json::from_value(message) {
                    Ok(call) => call,
                    Err(err) => {
                        warn!(
                            target = "dinstaller.orchestrator",
                            error = %err,
                            "ignoring malformed message"
                        );
                        continue;
                    }
                };
                let object = Arc::clone(&object);
                let outgoing = outgoing.clone();
                tokio::spawn(async move {
                    let reply = object.handle_call(&call).await;
                    send(&outgoing, &reply);
                });
            }
            changed = recv_status(&mut status) => match changed {
                Ok(code) => send(&outgoing, &status_signal(code)),
                // The latest transitions are still buffered and follow.
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(target = "dinstaller.orchestrator", missed, "status listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => status = None,
            },
        }
    }
    debug!(target = "dinstaller.orchestrator", "bus peer disconnected");
}

async fn recv_status(
    status: &mut Option<broadcast::Receiver<InstallerStatus>>,
) -> Result<InstallerStatus, broadcast::error::RecvError> {
    match status {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn send<T: Serialize>(outgoing: &mpsc::UnboundedSender<Value>, message: &T) {
    match serde_json::to_value(message) {
        Ok(value) => {
            if outgoing.send(value).is_err() {
                debug!(target = "dinstaller.orchestrator", "bus peer gone; dropping message");
            }
        }
        Err(err) => {
            error!(target = "dinstaller.orchestrator", error = %err, "failed to encode message")
        }
    }
}
