//! Install progress accounting and forwarding.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::backend::{Forward, PackageEvent};

/// Packages to install and packages done so far. Only ever grows during a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub total_packages: u64,
    pub completed: u64,
}

impl ProgressState {
    pub fn new(total_packages: u64) -> Self {
        Self {
            total_packages,
            completed: 0,
        }
    }

    /// Counts one more installed package, never past the total.
    pub fn record_installed(&mut self) {
        self.completed = (self.completed + 1).min(self.total_packages);
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total_packages
    }

    /// Completed share in `0.0..=1.0`; an empty install counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total_packages == 0 {
            1.0
        } else {
            self.completed as f64 / self.total_packages as f64
        }
    }
}

/// Receiver of install progress supplied by the caller of `install`.
pub trait ProgressSink: Send + 'static {
    /// Called once, before the commit starts.
    fn packages_to_install(&mut self, total: u64);

    fn package_started(&mut self, _package: &str) {}

    fn package_installed(&mut self, package: &str, progress: ProgressState);
}

/// Sink that only logs.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn packages_to_install(&mut self, total: u64) {
        tracing::info!(target = "dinstaller.orchestrator", total, "packages to install");
    }

    fn package_started(&mut self, package: &str) {
        tracing::debug!(target = "dinstaller.orchestrator", %package, "installing package");
    }

    fn package_installed(&mut self, package: &str, progress: ProgressState) {
        tracing::info!(
            target = "dinstaller.orchestrator",
            %package,
            completed = progress.completed,
            total = progress.total_packages,
            "package installed"
        );
    }
}

/// Drains backend events into `sink` until the commit is over.
pub(crate) async fn forward_progress<S: ProgressSink>(
    mut events: mpsc::Receiver<Forward>,
    mut sink: S,
    state: Arc<Mutex<ProgressState>>,
) {
    while let Some(message) = events.recv().await {
        match message {
            Forward::Package(PackageEvent::Started { package }) => sink.package_started(&package),
            Forward::Package(PackageEvent::Installed { package }) => {
                let snapshot = {
                    let mut state = state.lock();
                    state.record_installed();
                    *state
                };
                sink.package_installed(&package, snapshot);
            }
            Forward::Done => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_never_exceeds_total() {
        let mut state = ProgressState::new(2);
        for _ in 0..5 {
            state.record_installed();
        }
        assert_eq!(state.completed, 2);
        assert!(state.is_complete());
    }

    #[test]
    fn fraction_of_empty_install_is_done() {
        assert_eq!(ProgressState::new(0).fraction(), 1.0);
        let mut state = ProgressState::new(4);
        state.record_installed();
        assert_eq!(state.fraction(), 0.25);
    }

    #[derive(Default)]
    struct Recorder(Arc<Mutex<Vec<(String, u64)>>>);

    impl ProgressSink for Recorder {
        fn packages_to_install(&mut self, _total: u64) {}

        fn package_installed(&mut self, package: &str, progress: ProgressState) {
            self.0.lock().push((package.to_string(), progress.completed));
        }
    }

    #[tokio::test]
    async fn forwarder_stops_at_done_and_updates_state() {
        let (tx, rx) = mpsc::channel(4);
        let state = Arc::new(Mutex::new(ProgressState::new(3)));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Recorder(Arc::clone(&seen));
        let task = tokio::spawn(forward_progress(rx, sink, Arc::clone(&state)));

        for package in ["a", "b"] {
            let started = PackageEvent::Started { package: package.into() };
            let installed = PackageEvent::Installed { package: package.into() };
            tx.send(Forward::Package(started)).await.unwrap();
            tx.send(Forward::Package(installed)).await.unwrap();
        }
        tx.send(Forward::Done).await.unwrap();
        task.await.unwrap();

        assert_eq!(*seen.lock(), vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        assert_eq!(state.lock().completed, 2);
    }
}
