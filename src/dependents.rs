//! Registry of resources whose lifetime is bounded by a connection.
//!
//! A dependent registers itself when it is created and removes itself when
//! it closes. The registry only holds [`Weak`] references: it can reach a
//! dependent to force-close it during teardown but never keeps one alive.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, Weak};

/// Something the owning connection can force-close.
pub trait Dependent: Send + Sync {
    /// Closes the dependent, discarding any backend error. Must leave the
    /// dependent closed and deregistered.
    fn force_close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependentId(u64);

impl fmt::Display for DependentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependent#{}", self.0)
    }
}

#[derive(Default)]
pub struct DependentRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<DependentId, Weak<dyn Dependent>>>,
}

impl DependentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out an identifier ahead of registration so the dependent can
    /// store its own id before it is shared.
    pub fn allocate_id(&self) -> DependentId {
        DependentId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register(&self, id: DependentId, dependent: Weak<dyn Dependent>) {
        self.entries().insert(id, dependent);
    }

    /// Returns whether `id` was registered.
    pub fn remove(&self, id: DependentId) -> bool {
        self.entries().remove(&id).is_some()
    }

    pub fn contains(&self, id: DependentId) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live dependents. The lock is released before the
    /// caller acts on them, since closing a dependent calls back into
    /// [`remove`](Self::remove).
    pub fn snapshot(&self) -> Vec<(DependentId, Weak<dyn Dependent>)> {
        self.entries()
            .iter()
            .map(|(id, weak)| (*id, Weak::clone(weak)))
            .collect()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<DependentId, Weak<dyn Dependent>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for DependentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.entries().keys().copied().collect();
        ids.sort();
        f.debug_struct("DependentRegistry")
            .field("dependents", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    struct Flag(AtomicBool);

    impl Dependent for Flag {
        fn force_close(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn register_and_remove() {
        let registry = DependentRegistry::new();
        let dep: Arc<dyn Dependent> = Arc::new(Flag(AtomicBool::new(false)));
        let id = registry.allocate_id();
        registry.register(id, Arc::downgrade(&dep));

        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_are_unique() {
        let registry = DependentRegistry::new();
        let a = registry.allocate_id();
        let b = registry.allocate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn registry_does_not_keep_dependents_alive() {
        let registry = DependentRegistry::new();
        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let weak: Weak<dyn Dependent> = Arc::<Flag>::downgrade(&flag);
        let id = registry.allocate_id();
        registry.register(id, weak);

        for (_, weak) in registry.snapshot() {
            weak.upgrade().unwrap().force_close();
        }
        assert!(flag.0.load(Ordering::SeqCst));

        drop(flag);
        assert!(registry.snapshot()[0].1.upgrade().is_none());
    }
}
