//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value and
//! notifies whoever depends on it when that value changes.
//!
//! # How Cells Work
//!
//! 1. When a cell is read within a tracked evaluation (computed node or
//!    observer), the cell registers itself in the evaluation's tracker frame.
//!
//! 2. When a cell's value changes, dependent computed nodes are marked dirty
//!    immediately and external listeners are notified through the
//!    transaction coordinator.
//!
//! 3. Writing a value equal to the current one does nothing.
//!
//! # Thread Safety
//!
//! The value is protected by a `parking_lot::RwLock` and the listener list
//! is shared behind an `Arc`, so clones of a cell can move across threads.
//!
//! # Disposal
//!
//! [`Cell::dispose`] clears the listener list. The cell keeps working, but
//! later writes reach no one.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::listener::{Listeners, Notifiable};
use super::memo::Snapshot;
use super::runtime::Runtime;
use super::source::Source;
use super::transaction::{self, Transaction};
use crate::graph::{NodeId, NodeKind, NodeLabel};

struct CellInner<T> {
    name: Option<Arc<str>>,
    value: RwLock<T>,
    listeners: Arc<Listeners>,
}

impl<T> Source for CellInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn label(&self) -> NodeLabel {
        NodeLabel::new(self.listeners.owner(), NodeKind::Cell, self.name.clone())
    }

    fn listeners(&self) -> &Arc<Listeners> {
        &self.listeners
    }

    fn snapshot(&self) -> Option<Snapshot> {
        Some(Snapshot::new(self.value.read().clone()))
    }
}

/// A reactive cell holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the cell. `PartialEq` decides whether
///   a write is a change.
///
/// # Example
///
/// ```rust
/// use cellgraph_core::reactive::Cell;
///
/// let count = Cell::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies listeners)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Cell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<CellInner<T>>,
}

impl<T> Cell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self::build(None, value)
    }

    /// Create a named cell. The name shows up in debug output.
    pub fn named(name: impl Into<Arc<str>>, value: T) -> Self {
        Self::build(Some(name.into()), value)
    }

    fn build(name: Option<Arc<str>>, value: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                name,
                value: RwLock::new(value),
                listeners: Arc::new(Listeners::new(NodeId::new())),
            }),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.listeners.owner()
    }

    /// Get the cell's label.
    pub fn label(&self) -> NodeLabel {
        self.inner.label()
    }

    /// Get the current value.
    ///
    /// If called within a tracked evaluation, this also records the cell as
    /// a dependency of that evaluation.
    pub fn get(&self) -> T {
        Runtime::with(|runtime| {
            runtime
                .tracker()
                .record(NodeKind::Cell, self.id(), || self.as_source());
        });
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value.
    ///
    /// Equal values are ignored. Otherwise dependents are marked dirty and
    /// listeners are notified, right away or when the enclosing transaction
    /// exits.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return;
            }
            *guard = value;
        }

        trace!(cell = %self.label(), "cell changed");
        Transaction::run(|| {
            transaction::schedule_notification(&self.inner.listeners);
            self.inner.listeners.propagate();
        });
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get_untracked();
        self.set(f(&current));
    }

    /// Remove every listener and dependent.
    ///
    /// Safe to call more than once.
    pub fn dispose(&self) {
        self.inner.listeners.clear();
    }

    /// Number of computed nodes and observers currently depending on this
    /// cell.
    pub fn dependent_count(&self) -> usize {
        self.inner.listeners.dependent_count()
    }

    pub(crate) fn as_source(&self) -> Arc<dyn Source> {
        Arc::clone(&self.inner) as Arc<dyn Source>
    }
}

impl<T> Notifiable for Cell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn listeners(&self) -> &Arc<Listeners> {
        &self.inner.listeners
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("label", &self.label().to_string())
            .field("value", &self.get_untracked())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counted(cell: &Cell<i32>) -> (Arc<AtomicI32>, crate::reactive::ListenerId) {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let id = cell.add_listener(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, id)
    }

    #[test]
    fn cell_get_and_set() {
        let cell = Cell::new(0);
        assert_eq!(cell.get(), 0);

        cell.set(42);
        assert_eq!(cell.get(), 42);
    }

    #[test]
    fn cell_update() {
        let cell = Cell::new(10);
        cell.update(|v| v + 5);
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn cell_notifies_listeners() {
        let cell = Cell::new(0);
        let (count, _) = counted(&cell);

        assert_eq!(count.load(Ordering::SeqCst), 0);

        cell.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        cell.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn equal_write_is_noop() {
        let cell = Cell::new(String::from("same"));
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        cell.add_listener(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(String::from("same"));
        cell.update(|v| v.clone());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cell_remove_listener() {
        let cell = Cell::new(0);
        let (count, id) = counted(&cell);

        cell.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        cell.remove_listener(id);
        cell.set(2);
        // Should not have been called again
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Removing twice is fine
        cell.remove_listener(id);
    }

    #[test]
    fn disposed_cell_is_a_dead_end() {
        let cell = Cell::new(0);
        let (count, _) = counted(&cell);

        cell.dispose();
        cell.dispose();
        cell.set(7);

        assert_eq!(cell.get(), 7);
        assert_eq!(cell.listener_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_write_another_cell() {
        let a = Cell::new(0);
        let b = Cell::new(0);
        let (b_count, _) = counted(&b);

        {
            let a_handle = a.clone();
            let b = b.clone();
            a.add_listener(move || b.set(a_handle.get() + 100));
        }

        a.set(1);
        assert_eq!(b.get(), 101);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cell_clone_shares_state() {
        let cell1 = Cell::new(0);
        let cell2 = cell1.clone();

        cell1.set(42);
        assert_eq!(cell2.get(), 42);

        cell2.set(100);
        assert_eq!(cell1.get(), 100);
        assert_eq!(cell1.id(), cell2.id());
    }

    #[test]
    fn cell_ids_are_unique() {
        let c1 = Cell::new(0);
        let c2 = Cell::new(0);
        let c3 = Cell::new(0);

        assert_ne!(c1.id(), c2.id());
        assert_ne!(c2.id(), c3.id());
        assert_ne!(c1.id(), c3.id());
    }

    #[test]
    fn named_cell_label() {
        let price = Cell::named("price", 100);
        assert_eq!(price.label().name(), Some("price"));
        assert_eq!(price.label().kind(), NodeKind::Cell);
    }

    #[test]
    fn cell_is_shareable_across_threads() {
        let cell = Cell::new(1);
        let handle = cell.clone();

        std::thread::spawn(move || handle.set(2)).join().unwrap();
        assert_eq!(cell.get(), 2);
    }
}
