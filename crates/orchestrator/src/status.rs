//! Broadcast of installer status transitions.

use std::sync::atomic::{AtomicI32, Ordering};

use dinstaller_protocol::InstallerStatus;
use tokio::sync::broadcast;

/// Current status plus a broadcast of every change.
#[derive(Debug)]
pub struct StatusPublisher {
    current: AtomicI32,
    tx: broadcast::Sender<InstallerStatus>,
}

impl StatusPublisher {
    /// Publisher starting at IDLE that keeps up to `capacity` transitions
    /// for a subscriber that falls behind.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            current: AtomicI32::new(InstallerStatus::IDLE.code()),
            tx,
        }
    }

    pub fn current(&self) -> InstallerStatus {
        InstallerStatus::from_code(self.current.load(Ordering::Acquire))
    }

    /// Records `status` and broadcasts it if it differs from the current one.
    pub fn publish(&self, status: InstallerStatus) {
        let previous = self.current.swap(status.code(), Ordering::AcqRel);
        if previous != status.code() {
            tracing::debug!(
                target = "dinstaller.orchestrator",
                from = previous,
                to = status.code(),
                "status changed"
            );
            // No receivers is fine.
            let _ = self.tx.send(status);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstallerStatus> {
        self.tx.subscribe()
    }
}
