//! Signal handler registry and subscription handles.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dinstaller_protocol::Signal;
use parking_lot::Mutex;

pub(crate) type SignalHandler = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Which signals a handler wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignalMatch {
    pub path: String,
    pub interface: String,
    pub signal: String,
}

impl SignalMatch {
    fn matches(&self, signal: &Signal) -> bool {
        self.signal == signal.signal
            && self.interface == signal.interface
            && self.path == signal.path
    }
}

struct Entry {
    id: u64,
    rule: SignalMatch,
    active: Arc<AtomicBool>,
    handler: SignalHandler,
}

/// Handlers in registration order.
#[derive(Default)]
pub(crate) struct SignalRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl SignalRegistry {
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        rule: SignalMatch,
        handler: SignalHandler,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.entries.lock().push(Entry {
            id,
            rule,
            active: Arc::clone(&active),
            handler,
        });
        Subscription {
            id,
            active,
            registry: Arc::downgrade(self),
        }
    }

    /// Invokes every matching handler. Handlers run outside the registry lock
    /// and are skipped once their subscription has been cancelled.
    pub(crate) fn emit(&self, signal: &Signal) -> usize {
        let matching: Vec<(Arc<AtomicBool>, SignalHandler)> = self
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.rule.matches(signal))
            .map(|entry| (Arc::clone(&entry.active), Arc::clone(&entry.handler)))
            .collect();

        let mut delivered = 0;
        for (active, handler) in matching {
            if active.load(Ordering::Acquire) {
                handler(signal);
                delivered += 1;
            }
        }
        delivered
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn remove(&self, id: u64) {
        self.entries.lock().retain(|entry| entry.id != id);
    }
}

/// Handle for a registered signal handler.
///
/// [`unsubscribe`](Self::unsubscribe) stops all future deliveries and may be
/// called any number of times. Dropping the handle unsubscribes as well.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<SignalRegistry>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.id);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn rule() -> SignalMatch {
        SignalMatch {
            path: "/p".into(),
            interface: "i".into(),
            signal: "Changed".into(),
        }
    }

    fn signal(name: &str) -> Signal {
        Signal {
            path: "/p".into(),
            interface: "i".into(),
            signal: name.into(),
            args: vec![],
        }
    }

    #[test]
    fn only_matching_signals_are_delivered() {
        let registry = Arc::new(SignalRegistry::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = registry.subscribe(rule(), Arc::new(move |_: &Signal| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.emit(&signal("Changed"));
        registry.emit(&signal("Other"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_removes_entry() {
        let registry = Arc::new(SignalRegistry::default());
        let sub = registry.subscribe(rule(), Arc::new(|_: &Signal| {}));
        assert_eq!(registry.len(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.emit(&signal("Changed")), 0);
    }

    #[test]
    fn dropping_handle_unsubscribes() {
        let registry = Arc::new(SignalRegistry::default());
        drop(registry.subscribe(rule(), Arc::new(|_: &Signal| {})));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn handle_outliving_registry_is_harmless() {
        let registry = Arc::new(SignalRegistry::default());
        let sub = registry.subscribe(rule(), Arc::new(|_: &Signal| {}));
        drop(registry);
        sub.unsubscribe();
    }
}
