use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dinstaller_protocol::{InstallerStatus, Product};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::backend::{
    BackendError, CommitResult, Forward, PackageBackend, ProgressReporter, ProposalOptions,
};
use crate::error::{OrchestratorError, Result};
use crate::progress::{ProgressSink, ProgressState, forward_progress};
use crate::status::StatusPublisher;

/// Workflow position of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Uninitialized,
    Probed,
    Proposed,
    Installing,
    Completed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Probed => "probed",
            Self::Proposed => "proposed",
            Self::Installing => "installing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Root of the system being installed.
    pub install_root: PathBuf,
    /// Capacity of the progress buffer between the commit thread and the sink.
    pub progress_buffer: usize,
    /// Status transitions kept for each subscriber that falls behind.
    pub status_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("/mnt"),
            progress_buffer: 64,
            status_buffer: 64,
        }
    }
}

/// Result of a successful [`Orchestrator::install`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub progress: ProgressState,
}

#[derive(Debug, Default)]
struct State {
    phase: Phase,
    products: Vec<Product>,
    selected: Option<String>,
}

/// Claim on the single install slot of an [`Orchestrator`], returned by
/// [`Orchestrator::begin_install`]. The slot is released on drop.
#[derive(Debug)]
#[must_use = "the install slot is released as soon as the guard is dropped"]
pub struct InstallGuard(Arc<AtomicBool>);

impl Drop for InstallGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Software workflow on top of a [`PackageBackend`]: probe, product
/// selection, proposal and install.
pub struct Orchestrator {
    backend: Arc<dyn PackageBackend>,
    config: OrchestratorConfig,
    state: Mutex<State>,
    progress: Arc<Mutex<ProgressState>>,
    installing: Arc<AtomicBool>,
    /// Serializes probe, product selection, propose and install.
    ops: tokio::sync::Mutex<()>,
    status: StatusPublisher,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("installing", &self.is_installing())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn PackageBackend>, config: OrchestratorConfig) -> Self {
        Self {
            backend,
            status: StatusPublisher::new(config.status_buffer),
            config,
            state: Mutex::new(State::default()),
            progress: Arc::new(Mutex::new(ProgressState::default())),
            installing: Arc::new(AtomicBool::new(false)),
            ops: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn products(&self) -> Vec<Product> {
        self.state.lock().products.clone()
    }

    pub fn selected_product(&self) -> Option<String> {
        self.state.lock().selected.clone()
    }

    pub fn progress(&self) -> ProgressState {
        *self.progress.lock()
    }

    pub fn status(&self) -> InstallerStatus {
        self.status.current()
    }

    /// Status transitions from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<InstallerStatus> {
        self.status.subscribe()
    }

    pub fn is_installing(&self) -> bool {
        self.installing.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn publish_status(&self, status: InstallerStatus) {
        self.status.publish(status);
    }

    /// Loads the target and the repositories, then replaces the product catalog.
    ///
    /// On failure the previous catalog, selection and phase are kept.
    pub async fn probe(&self) -> Result<()> {
        self.ensure_not_installing()?;
        let _ops = self.ops.lock().await;

        info!(target = "dinstaller.orchestrator", "Probing software");
        self.status.publish(InstallerStatus::PROBING);
        let result = self
            .blocking(|backend| {
                backend.target_initialize(std::path::Path::new("/"))?;
                backend.target_load()?;
                backend.source_restore()?;
                backend.source_load()?;
                backend.products()
            })
            .await;
        self.status.publish(InstallerStatus::IDLE);

        let products = result.inspect_err(|err| {
            error!(target = "dinstaller.orchestrator", error = %err, "probe failed");
        })?;
        info!(target = "dinstaller.orchestrator", count = products.len(), "products found");

        let mut state = self.state.lock();
        state.products = products;
        state.selected = None;
        state.phase = Phase::Probed;
        Ok(())
    }

    /// Selects `name` from the catalog. A different product invalidates an
    /// existing proposal.
    pub async fn select_product(&self, name: &str) -> Result<()> {
        self.ensure_not_installing()?;
        let _ops = self.ops.lock().await;

        let mut state = self.state.lock();
        if state.phase == Phase::Uninitialized {
            return Err(OrchestratorError::InvalidState {
                operation: "select a product",
                phase: state.phase,
            });
        }
        if !state.products.iter().any(|p| p.name == name) {
            return Err(OrchestratorError::InvalidSelection(name.to_string()));
        }

        if state.selected.as_deref() != Some(name) {
            state.selected = Some(name.to_string());
            if state.phase == Phase::Proposed {
                state.phase = Phase::Probed;
            }
        }
        info!(target = "dinstaller.orchestrator", product = %name, "product selected");
        Ok(())
    }

    /// Computes the software proposal for the selected product, defaulting
    /// to the first product in the catalog.
    pub async fn propose(&self) -> Result<()> {
        self.ensure_not_installing()?;
        let _ops = self.ops.lock().await;

        let product = {
            let mut state = self.state.lock();
            let Some(first) = state.products.first().map(|p| p.name.clone()) else {
                return Err(OrchestratorError::NoProductAvailable);
            };
            state.selected.get_or_insert(first).clone()
        };

        info!(target = "dinstaller.orchestrator", %product, "Proposing software");
        self.status.publish(InstallerStatus::PROPOSING);
        let result = self.blocking(|backend| backend.propose(ProposalOptions::FORCED)).await;
        self.status.publish(InstallerStatus::IDLE);
        result?;

        self.state.lock().phase = Phase::Proposed;
        Ok(())
    }

    /// Installs the proposed software, reporting progress to `sink`.
    ///
    /// Fails immediately with [`OrchestratorError::InstallationInProgress`]
    /// when another install is running.
    pub async fn install<S: ProgressSink>(&self, sink: S) -> Result<InstallReport> {
        let guard = self.begin_install()?;
        self.install_with_guard(guard, sink).await
    }

    /// Claims the install slot without waiting, so a caller can report a
    /// rejected install before running it elsewhere.
    ///
    /// Fails with [`OrchestratorError::InstallationInProgress`] when the slot
    /// is taken and with [`OrchestratorError::InvalidState`] when nothing is
    /// proposed.
    pub fn begin_install(&self) -> Result<InstallGuard> {
        if self
            .installing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(OrchestratorError::InstallationInProgress);
        }
        let guard = InstallGuard(Arc::clone(&self.installing));

        let phase = self.phase();
        if phase != Phase::Proposed {
            return Err(OrchestratorError::InvalidState {
                operation: "install",
                phase,
            });
        }
        Ok(guard)
    }

    /// Runs the install claimed by `guard`, which must come from this
    /// orchestrator's [`begin_install`](Self::begin_install).
    pub async fn install_with_guard<S: ProgressSink>(
        &self,
        guard: InstallGuard,
        sink: S,
    ) -> Result<InstallReport> {
        debug_assert!(Arc::ptr_eq(&guard.0, &self.installing));
        let _guard = guard;
        let _ops = self.ops.lock().await;

        {
            let mut state = self.state.lock();
            if state.phase != Phase::Proposed {
                return Err(OrchestratorError::InvalidState {
                    operation: "install",
                    phase: state.phase,
                });
            }
            state.phase = Phase::Installing;
        }

        self.status.publish(InstallerStatus::INSTALLING);
        let outcome = self.run_install(sink).await;

        let phase = match &outcome {
            Ok(report) => {
                info!(
                    target = "dinstaller.orchestrator",
                    installed = report.installed.len(),
                    "installation completed"
                );
                Phase::Completed
            }
            Err(err) => {
                error!(target = "dinstaller.orchestrator", error = %err, "installation failed");
                Phase::Failed
            }
        };
        self.state.lock().phase = phase;
        self.status.publish(InstallerStatus::IDLE);
        outcome
    }

    async fn run_install<S: ProgressSink>(&self, mut sink: S) -> Result<InstallReport> {
        let counts = self.blocking(|backend| backend.media_package_counts()).await?;
        let total = count_packages(&counts);
        *self.progress.lock() = ProgressState::new(total);
        info!(target = "dinstaller.orchestrator", total, "packages to install");
        sink.packages_to_install(total);

        let (tx, rx) = mpsc::channel(self.config.progress_buffer.max(1));
        self.backend.register_progress(ProgressReporter::new(tx.clone()));
        let forwarder = tokio::spawn(forward_progress(rx, sink, Arc::clone(&self.progress)));

        let root = self.config.install_root.clone();
        let committed = self
            .blocking(move |backend| {
                backend.target_initialize(&root)?;
                backend.commit()
            })
            .await;

        // The backend may keep its reporter; stop the forwarder explicitly.
        let _ = tx.send(Forward::Done).await;
        if let Err(err) = forwarder.await {
            warn!(
                target = "dinstaller.orchestrator",
                error = %err,
                "progress forwarder ended abnormally"
            );
        }

        let installed = match committed? {
            Some(CommitResult { installed }) if !installed.is_empty() => installed,
            _ => {
                let last_error = self.blocking(|backend| Ok(backend.last_error())).await?;
                return Err(OrchestratorError::CommitFailed { last_error });
            }
        };

        let progress = self.progress();
        if !progress.is_complete() {
            warn!(
                target = "dinstaller.orchestrator",
                completed = progress.completed,
                total = progress.total_packages,
                "commit finished before all counted packages were reported"
            );
        }
        Ok(InstallReport { installed, progress })
    }

    fn ensure_not_installing(&self) -> Result<()> {
        if self.is_installing() {
            return Err(OrchestratorError::InstallationInProgress);
        }
        Ok(())
    }

    /// Runs `f` against the backend on a blocking worker thread.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PackageBackend) -> std::result::Result<T, BackendError> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || f(backend.as_ref()))
            .await
            .map_err(|err| OrchestratorError::Worker(err.to_string()))?
            .map_err(OrchestratorError::from)
    }
}

/// Total packages over all media of all repositories.
pub fn count_packages(counts: &[Vec<u64>]) -> u64 {
    counts.iter().flatten().sum()
}
