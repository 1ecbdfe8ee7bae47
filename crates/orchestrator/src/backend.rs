//! Boundary to the package manager.
//!
//! The backend owns repositories, the resolver and the commit loop. All of
//! its operations block; the orchestrator calls them from blocking worker
//! threads.

use std::path::Path;

use dinstaller_protocol::Product;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct BackendError {
    pub operation: &'static str,
    pub message: String,
}

impl BackendError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Flags for the software proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalOptions {
    /// Discard the previous proposal.
    pub force_reset: bool,
    /// Reinitialize the package selection first.
    pub reinit: bool,
    /// Skip the interactive parts of the proposal.
    pub simple: bool,
}

impl ProposalOptions {
    /// Forced, reinitializing, simplified proposal.
    pub const FORCED: Self = Self {
        force_reset: true,
        reinit: true,
        simple: true,
    };
}

/// Outcome of a commit. Empty means nothing was installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResult {
    pub installed: Vec<String>,
}

impl CommitResult {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }
}

/// Per-package notification from the commit loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageEvent {
    Started { package: String },
    Installed { package: String },
}

#[derive(Debug)]
pub(crate) enum Forward {
    Package(PackageEvent),
    Done,
}

/// Callback handle given to the backend for package progress.
///
/// Sends into a bounded buffer: when it is full the commit thread waits
/// for the forwarder to catch up.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::Sender<Forward>,
}

impl ProgressReporter {
    pub(crate) fn new(tx: mpsc::Sender<Forward>) -> Self {
        Self { tx }
    }

    /// Reports `event`. Must be called from a blocking context, never from async code.
    pub fn report(&self, event: PackageEvent) {
        if self.tx.blocking_send(Forward::Package(event)).is_err() {
            tracing::debug!(
                target = "dinstaller.orchestrator",
                "progress receiver gone; dropping event"
            );
        }
    }

    pub fn package_started(&self, package: &str) {
        self.report(PackageEvent::Started {
            package: package.to_string(),
        });
    }

    pub fn package_installed(&self, package: &str) {
        self.report(PackageEvent::Installed {
            package: package.to_string(),
        });
    }
}

/// Package manager operations used by the orchestrator.
pub trait PackageBackend: Send + Sync + 'static {
    /// Points the package manager at the system rooted at `root`.
    fn target_initialize(&self, root: &Path) -> Result<(), BackendError>;

    /// Loads the installed-package database of the target.
    fn target_load(&self) -> Result<(), BackendError>;

    /// Restores the configured repositories.
    fn source_restore(&self) -> Result<(), BackendError>;

    /// Loads metadata of all enabled repositories.
    fn source_load(&self) -> Result<(), BackendError>;

    /// Products offered by the loaded repositories.
    fn products(&self) -> Result<Vec<Product>, BackendError>;

    fn propose(&self, options: ProposalOptions) -> Result<(), BackendError>;

    /// Package counts per medium, per repository.
    fn media_package_counts(&self) -> Result<Vec<Vec<u64>>, BackendError>;

    /// Installs the reporter that receives package callbacks during [`commit`](Self::commit).
    fn register_progress(&self, reporter: ProgressReporter);

    /// Installs the selected packages. `None` or an empty result means nothing was installed.
    fn commit(&self) -> Result<Option<CommitResult>, BackendError>;

    /// Description of the most recent backend failure.
    fn last_error(&self) -> String;
}
