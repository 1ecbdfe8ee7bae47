//! Installer-side software workflow.
//!
//! [`Orchestrator`] drives a [`PackageBackend`] through probe, product
//! selection, proposal and install, forwarding package progress to a
//! [`ProgressSink`] and publishing status transitions. [`InstallerObject`]
//! exposes it on the bus with the method and property names the client
//! uses.

pub mod backend;
pub mod error;
pub mod fake;
pub mod object;
mod orchestrator;
pub mod progress;
pub mod status;

pub use backend::{
    BackendError, CommitResult, PackageBackend, PackageEvent, ProgressReporter, ProposalOptions,
};
pub use error::{OrchestratorError, Result};
pub use fake::FakeBackend;
pub use object::{InstallerObject, StaticSystemInfo, SystemInfo, serve, status_signal};
pub use orchestrator::{
    InstallGuard, InstallReport, Orchestrator, OrchestratorConfig, Phase, count_packages,
};
pub use progress::{ProgressSink, ProgressState, TracingSink};
pub use status::StatusPublisher;
