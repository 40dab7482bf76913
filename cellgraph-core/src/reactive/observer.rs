//! Observers
//!
//! An Observer is the registration hook for external consumers such as a UI
//! rebuild boundary. The consumer evaluates its body through
//! [`Observer::track`]; every cell and computed node read during the body
//! becomes a dependency, and the observer subscribes to each of them the
//! same way a computed node does.
//!
//! After each evaluation the subscriptions are reconciled with the new
//! dependency set: dependencies no longer read are unsubscribed, new ones are
//! subscribed, and surviving ones keep their existing subscription.
//!
//! The observer is itself a notifiable entity. A change in any dependency
//! queues the observer in the transaction that made the change, so its
//! callback runs at most once per transaction however many dependencies
//! changed, and only after all dirtiness has been propagated.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::listener::{Listener, Listeners, Notifiable};
use super::source::Subscription;
use super::tracker::{FrameOwner, Tracking};
use super::transaction;
use crate::graph::{NodeId, NodeKind, NodeLabel};

struct ObserverInner {
    id: NodeId,
    name: Option<Arc<str>>,
    listeners: Arc<Listeners>,
    relay: Listener,
    subscriptions: Mutex<IndexMap<NodeId, Subscription>>,
    evaluations: AtomicU64,
}

impl ObserverInner {
    fn unsubscribe_all(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in subscriptions.values() {
            subscription.cancel();
        }
    }
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        for subscription in self.subscriptions.get_mut().values() {
            subscription.cancel();
        }
    }
}

/// An external consumer participating in dependency tracking.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use cellgraph_core::reactive::{Cell, Observer};
///
/// let name = Cell::new("world".to_string());
/// let rebuilds = Arc::new(AtomicUsize::new(0));
///
/// let boundary = {
///     let rebuilds = rebuilds.clone();
///     Observer::new(move || {
///         rebuilds.fetch_add(1, Ordering::SeqCst);
///     })
/// };
///
/// let rendered = boundary.track(|| format!("hello {}", name.get()));
/// assert_eq!(rendered, "hello world");
///
/// name.set("there".to_string());
/// assert_eq!(rebuilds.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ObserverInner>,
}

impl Observer {
    /// Create an observer whose `on_change` runs after any tracked
    /// dependency changes.
    pub fn new<F>(on_change: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(None, Arc::new(on_change))
    }

    /// Create a named observer.
    pub fn named<F>(name: impl Into<Arc<str>>, on_change: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Some(name.into()), Arc::new(on_change))
    }

    pub(crate) fn build(name: Option<Arc<str>>, on_change: Listener) -> Self {
        let id = NodeId::new();
        let listeners = Arc::new(Listeners::new(id));
        listeners.add_callback(on_change);
        let relay: Listener = {
            let entity = Arc::clone(&listeners);
            Arc::new(move || transaction::schedule_notification(&entity))
        };
        Self {
            inner: Arc::new(ObserverInner {
                id,
                name,
                listeners,
                relay,
                subscriptions: Mutex::new(IndexMap::new()),
                evaluations: AtomicU64::new(0),
            }),
        }
    }

    /// Get the observer's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the observer's label.
    pub fn label(&self) -> NodeLabel {
        NodeLabel::new(self.inner.id, NodeKind::Observer, self.inner.name.clone())
    }

    /// Evaluate `body`, collecting what it reads, and re-derive the
    /// observer's subscriptions from that set.
    ///
    /// If `body` panics the frame is popped and the previous subscriptions
    /// are left untouched.
    pub fn track<R>(&self, body: impl FnOnce() -> R) -> R {
        let tracking = Tracking::enter(FrameOwner::Node(self.inner.id));
        let output = body();
        let frame = tracking.finish();

        let mut subscriptions = self.inner.subscriptions.lock();
        let mut next = IndexMap::with_capacity(frame.len());
        for source in frame.into_sources() {
            let id = source.node_id();
            let subscription = match subscriptions.shift_remove(&id) {
                Some(existing) => existing,
                None => Subscription::dependent(source, Arc::clone(&self.inner.relay)),
            };
            next.insert(id, subscription);
        }
        for stale in subscriptions.values() {
            stale.cancel();
        }
        trace!(
            observer = %self.label(),
            dependencies = next.len(),
            dropped = subscriptions.len(),
            "observer re-derived dependencies"
        );
        *subscriptions = next;
        drop(subscriptions);

        self.inner.evaluations.fetch_add(1, Ordering::Relaxed);
        output
    }

    /// Number of dependencies currently subscribed.
    pub fn dependency_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    /// IDs of the dependencies currently subscribed, in first-read order.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.inner.subscriptions.lock().keys().copied().collect()
    }

    /// How many times [`Observer::track`] completed.
    pub fn evaluation_count(&self) -> u64 {
        self.inner.evaluations.load(Ordering::Relaxed)
    }

    /// Unsubscribe from every dependency. Safe to call more than once.
    pub fn dispose(&self) {
        self.inner.unsubscribe_all();
    }
}

impl Notifiable for Observer {
    fn listeners(&self) -> &Arc<Listeners> {
        &self.inner.listeners
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("label", &self.label().to_string())
            .field("dependency_count", &self.dependency_count())
            .field("evaluation_count", &self.evaluation_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Cell, Computed, Transaction};
    use std::sync::atomic::AtomicI32;

    fn counting_observer() -> (Observer, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let observer = Observer::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (observer, count)
    }

    #[test]
    fn observer_is_notified_by_tracked_reads() {
        let a = Cell::new(1);
        let b = Cell::new(2);
        let (observer, count) = counting_observer();

        let sum = observer.track(|| a.get() + b.get());
        assert_eq!(sum, 3);
        assert_eq!(observer.dependencies(), vec![a.id(), b.id()]);

        a.set(10);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        b.set(20);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn retracking_drops_stale_dependencies() {
        let flag = Cell::new(true);
        let a = Cell::new(1);
        let b = Cell::new(2);
        let (observer, count) = counting_observer();

        let body = || if flag.get() { a.get() } else { b.get() };

        observer.track(body);
        assert_eq!(a.dependent_count(), 1);

        flag.set(false);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        observer.track(body);

        assert_eq!(a.dependent_count(), 0);
        assert_eq!(b.dependent_count(), 1);
        assert_eq!(flag.dependent_count(), 1);

        a.set(100);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        b.set(200);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn observer_sees_computed_changes_once_per_transaction() {
        let x = Cell::new(1);
        let y = Cell::new(2);
        let sum = {
            let (x, y) = (x.clone(), y.clone());
            Computed::new(move || x.get() + y.get())
        };
        let (observer, count) = counting_observer();
        observer.track(|| sum.get());

        Transaction::run(|| {
            x.set(10);
            y.set(20);
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(sum.get(), 30);
    }

    #[test]
    fn several_changed_dependencies_notify_once() {
        let a = Cell::new(1);
        let b = Cell::new(2);
        let (observer, count) = counting_observer();
        observer.track(|| a.get() + b.get());

        Transaction::run(|| {
            a.set(3);
            b.set(4);
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observer_of_failed_computed_is_notified_when_input_is_fixed() {
        let divisor = Cell::new(0);
        let quotient = {
            let divisor = divisor.clone();
            Computed::try_new(move || match divisor.get() {
                0 => Err(crate::ReactiveError::msg("division by zero")),
                d => Ok(100 / d),
            })
        };
        let (observer, rebuilds) = counting_observer();

        assert!(observer.track(|| quotient.try_get()).is_err());
        assert_eq!(observer.dependencies(), vec![quotient.id()]);

        divisor.set(4);
        assert_eq!(rebuilds.load(Ordering::SeqCst), 1);
        assert_eq!(observer.track(|| quotient.try_get()).unwrap(), 25);
    }

    #[test]
    fn dispose_and_drop_unsubscribe() {
        let cell = Cell::new(0);
        let (observer, count) = counting_observer();
        observer.track(|| cell.get());

        observer.dispose();
        observer.dispose();
        cell.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        {
            let (scoped, _) = counting_observer();
            scoped.track(|| cell.get());
            assert_eq!(cell.dependent_count(), 1);
        }
        assert_eq!(cell.dependent_count(), 0);
    }

    #[test]
    fn panicking_body_keeps_previous_subscriptions() {
        let cell = Cell::new(0);
        let (observer, _) = counting_observer();
        observer.track(|| cell.get());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            observer.track(|| -> i32 { panic!("render failed") })
        }));

        assert!(result.is_err());
        assert_eq!(observer.dependency_count(), 1);
        assert_eq!(observer.evaluation_count(), 1);
        assert!(!crate::reactive::is_tracking());
    }
}
