//! Listener lists for reactive entities.
//!
//! Every reactive entity owns a shared [`Listeners`] list instead of
//! inheriting notification behavior. The [`Notifiable`] trait exposes the
//! subscribe/notify contract on top of it.
//!
//! A list holds two kinds of entries:
//!
//! - *callbacks*: external listeners added with [`Notifiable::add_listener`].
//!   They are delivered through the transaction coordinator, so they run once
//!   per flush and only after dirtiness has been fully propagated.
//! - *dependents*: handlers installed by computed nodes and observers. They
//!   run immediately when the entity changes and only mark or queue their
//!   owner.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::transaction;
use crate::graph::NodeId;

/// A listener callback. Takes no arguments; listeners re-read values
/// themselves.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Unique identifier for a registered listener.
///
/// Returned by [`Notifiable::add_listener`] and used to remove the listener
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Entries {
    callbacks: IndexMap<ListenerId, Listener>,
    dependents: IndexMap<ListenerId, Listener>,
}

/// The ordered listener list of one reactive entity.
///
/// Fan-out works on a snapshot of the list, so listeners may add or remove
/// listeners (including themselves) while being invoked. A listener removed
/// during a fan-out still runs in that fan-out.
pub struct Listeners {
    owner: NodeId,
    entries: Mutex<Entries>,
}

impl Listeners {
    /// Create an empty list owned by `owner`.
    pub fn new(owner: NodeId) -> Self {
        Self {
            owner,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// The entity this list belongs to.
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// Register an external callback.
    pub fn add_callback(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.entries.lock().callbacks.insert(id, listener);
        id
    }

    /// Register a dependent handler.
    pub(crate) fn add_dependent(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.entries.lock().dependents.insert(id, listener);
        id
    }

    /// Remove a callback or dependent. Unknown ids are ignored.
    pub fn remove(&self, id: ListenerId) {
        let mut entries = self.entries.lock();
        if entries.callbacks.shift_remove(&id).is_none() {
            entries.dependents.shift_remove(&id);
        }
    }

    /// Drop every callback and dependent.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.callbacks.clear();
        entries.dependents.clear();
    }

    /// Number of external callbacks.
    pub fn callback_count(&self) -> usize {
        self.entries.lock().callbacks.len()
    }

    /// Number of dependent handlers.
    pub fn dependent_count(&self) -> usize {
        self.entries.lock().dependents.len()
    }

    /// Invoke every external callback in registration order.
    pub(crate) fn notify_callbacks(&self) {
        let snapshot: SmallVec<[Listener; 4]> =
            self.entries.lock().callbacks.values().cloned().collect();
        for listener in snapshot {
            listener();
        }
    }

    /// Invoke every dependent in registration order.
    pub(crate) fn propagate(&self) {
        let snapshot: SmallVec<[Listener; 4]> =
            self.entries.lock().dependents.values().cloned().collect();
        for dependent in snapshot {
            dependent();
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("owner", &self.owner)
            .field("callbacks", &self.callback_count())
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

/// Anything that exposes a listener list.
///
/// Cells, computed nodes and any future reactive entity share the
/// subscribe/notify behavior through this trait.
pub trait Notifiable {
    /// The entity's listener list.
    fn listeners(&self) -> &Arc<Listeners>;

    /// Register a callback invoked after this entity changes.
    fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
        Self: Sized,
    {
        self.listeners().add_callback(Arc::new(listener))
    }

    /// Remove a callback. Removing an unknown listener is a no-op.
    fn remove_listener(&self, id: ListenerId) {
        self.listeners().remove(id);
    }

    /// Request delivery of this entity's callbacks, deferred while a
    /// transaction is active.
    fn notify(&self) {
        transaction::schedule_notification(self.listeners());
    }

    /// Number of registered external callbacks.
    fn listener_count(&self) -> usize {
        self.listeners().callback_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter() -> (Arc<AtomicI32>, Listener) {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let listener: Listener = Arc::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[test]
    fn listener_ids_are_unique() {
        let id1 = ListenerId::new();
        let id2 = ListenerId::new();
        let id3 = ListenerId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn callbacks_and_dependents_are_separate() {
        let listeners = Listeners::new(NodeId::new());
        let (callback_count, callback) = counter();
        let (dependent_count, dependent) = counter();

        listeners.add_callback(callback);
        listeners.add_dependent(dependent);

        listeners.propagate();
        assert_eq!(callback_count.load(Ordering::SeqCst), 0);
        assert_eq!(dependent_count.load(Ordering::SeqCst), 1);

        listeners.notify_callbacks();
        assert_eq!(callback_count.load(Ordering::SeqCst), 1);
        assert_eq!(dependent_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let listeners = Listeners::new(NodeId::new());
        let (count, listener) = counter();
        let id = listeners.add_callback(listener);

        listeners.remove(ListenerId::new());
        assert_eq!(listeners.callback_count(), 1);

        listeners.remove(id);
        listeners.remove(id);
        assert_eq!(listeners.callback_count(), 0);

        listeners.notify_callbacks();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_remove_itself_during_fanout() {
        let listeners = Arc::new(Listeners::new(NodeId::new()));
        let slot = Arc::new(Mutex::new(None::<ListenerId>));
        let calls = Arc::new(AtomicI32::new(0));

        let id = {
            let handle = listeners.clone();
            let slot = slot.clone();
            let calls = calls.clone();
            listeners.add_callback(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock() {
                    handle.remove(id);
                }
            }))
        };
        *slot.lock() = Some(id);

        listeners.notify_callbacks();
        listeners.notify_callbacks();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let listeners = Listeners::new(NodeId::new());
        listeners.add_callback(Arc::new(|| {}));
        listeners.add_dependent(Arc::new(|| {}));

        listeners.clear();
        assert_eq!(listeners.callback_count(), 0);
        assert_eq!(listeners.dependent_count(), 0);
    }
}
