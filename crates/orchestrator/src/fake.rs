//! In-memory [`PackageBackend`] for tests and demos.
//!
//! Records every operation it receives, reports package progress for a
//! scripted package list during `commit`, and can be told to fail or to
//! hold any operation until released.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;

use dinstaller_protocol::Product;
use parking_lot::Mutex;

use crate::backend::{BackendError, CommitResult, PackageBackend, ProgressReporter, ProposalOptions};

#[derive(Debug, Default)]
pub struct FakeBackend {
    products: Mutex<Vec<Product>>,
    media_counts: Mutex<Vec<Vec<u64>>>,
    packages: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, String>>,
    last_error: Mutex<String>,
    calls: Mutex<Vec<&'static str>>,
    roots: Mutex<Vec<PathBuf>>,
    proposals: Mutex<Vec<ProposalOptions>>,
    reporter: Mutex<Option<ProgressReporter>>,
    gates: Mutex<HashMap<&'static str, std_mpsc::Receiver<()>>>,
}

impl FakeBackend {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: Mutex::new(products),
            ..Self::default()
        }
    }

    /// Per-medium counts, and the packages `commit` installs.
    pub fn with_packages(self, media_counts: Vec<Vec<u64>>, packages: &[&str]) -> Self {
        *self.media_counts.lock() = media_counts;
        *self.packages.lock() = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn set_products(&self, products: Vec<Product>) {
        *self.products.lock() = products;
    }

    /// Makes `operation` fail with `message` until cleared.
    pub fn fail(&self, operation: &'static str, message: &str) {
        self.failures.lock().insert(operation, message.to_string());
        *self.last_error.lock() = message.to_string();
    }

    pub fn clear_failure(&self, operation: &'static str) {
        self.failures.lock().remove(operation);
    }

    pub fn set_last_error(&self, message: &str) {
        *self.last_error.lock() = message.to_string();
    }

    /// Holds the next call of `operation` until the returned sender fires
    /// or is dropped. The call is recorded before it blocks.
    pub fn gate(&self, operation: &'static str) -> std_mpsc::Sender<()> {
        let (tx, rx) = std_mpsc::channel();
        self.gates.lock().insert(operation, rx);
        tx
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == operation).count()
    }

    pub fn initialized_roots(&self) -> Vec<PathBuf> {
        self.roots.lock().clone()
    }

    pub fn proposals(&self) -> Vec<ProposalOptions> {
        self.proposals.lock().clone()
    }

    fn enter(&self, operation: &'static str) -> Result<(), BackendError> {
        self.calls.lock().push(operation);

        let gate = self.gates.lock().remove(operation);
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        match self.failures.lock().get(operation) {
            Some(message) => Err(BackendError::new(operation, message.clone())),
            None => Ok(()),
        }
    }
}

impl PackageBackend for FakeBackend {
    fn target_initialize(&self, root: &Path) -> Result<(), BackendError> {
        self.enter("target_initialize")?;
        self.roots.lock().push(root.to_path_buf());
        Ok(())
    }

    fn target_load(&self) -> Result<(), BackendError> {
        self.enter("target_load")
    }

    fn source_restore(&self) -> Result<(), BackendError> {
        self.enter("source_restore")
    }

    fn source_load(&self) -> Result<(), BackendError> {
        self.enter("source_load")
    }

    fn products(&self) -> Result<Vec<Product>, BackendError> {
        self.enter("products")?;
        Ok(self.products.lock().clone())
    }

    fn propose(&self, options: ProposalOptions) -> Result<(), BackendError> {
        self.enter("propose")?;
        self.proposals.lock().push(options);
        Ok(())
    }

    fn media_package_counts(&self) -> Result<Vec<Vec<u64>>, BackendError> {
        self.enter("media_package_counts")?;
        Ok(self.media_counts.lock().clone())
    }

    fn register_progress(&self, reporter: ProgressReporter) {
        self.calls.lock().push("register_progress");
        *self.reporter.lock() = Some(reporter);
    }

    fn commit(&self) -> Result<Option<CommitResult>, BackendError> {
        self.enter("commit")?;

        let packages = self.packages.lock().clone();
        let reporter = self.reporter.lock().clone();
        if let Some(reporter) = reporter {
            for package in &packages {
                reporter.package_started(package);
                reporter.package_installed(package);
            }
        }

        if packages.is_empty() {
            return Ok(None);
        }
        Ok(Some(CommitResult { installed: packages }))
    }

    fn last_error(&self) -> String {
        self.last_error.lock().clone()
    }
}
