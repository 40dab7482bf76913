//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computed Nodes Work
//!
//! 1. Nothing runs on creation. The node starts [`ComputedState::Dirty`].
//!
//! 2. On first read, the function runs inside a fresh tracker frame. Every
//!    cell and computed node it reads becomes a dependency, and the node
//!    subscribes a dirty-marking handler to each of them.
//!
//! 3. When a dependency changes, the handler marks the node
//!    [`ComputedState::MaybeDirty`] and passes the news on to the node's own
//!    dependents and listeners. Nothing is recomputed yet.
//!
//! 4. The next read recomputes. Old subscriptions are dropped first and the
//!    dependency set is rebuilt from scratch, so branches that stop reading a
//!    cell stop depending on it.
//!
//! # Memoization
//!
//! With memoization enabled, a node dirtied by an upstream notification
//! first compares a memo key (value snapshots of its previously recorded
//! dependencies) with the key stored by the previous recomputation and
//! keeps its cached value when they match. The key is taken before the
//! function runs, so the first recomputation after the dependency set
//! changes never hits.
//!
//! # Failures
//!
//! A cycle or a failing function is reported to the reader. The node stays
//! [`ComputedState::Dirty`] without a cached value, so the next read retries
//! from scratch. A failed node stays subscribed to what it read before
//! failing: when one of those inputs changes, its dependents and listeners
//! hear about it and can retry. A node caught in a cycle keeps no
//! dependencies.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::listener::{Listener, Listeners, Notifiable};
use super::memo::{MemoKey, Snapshot};
use super::runtime::Runtime;
use super::source::{Source, Subscription};
use super::tracker::{untracked, FrameOwner, Tracking};
use super::transaction::{self, Transaction};
use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKind, NodeLabel};

type ComputeFn<T> = Box<dyn Fn() -> Result<T, ReactiveError> + Send + Sync>;

/// Dirty state for a computed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed. With memoization, the next read may still keep
    /// the cached value.
    MaybeDirty,

    /// The node must recompute: never computed, invalidated, or failed.
    Dirty,
}

/// Construction options for a [`Computed`].
#[derive(Debug, Clone, Default)]
pub struct ComputedOptions {
    name: Option<Arc<str>>,
    memoize: Option<bool>,
}

impl ComputedOptions {
    /// Default options: anonymous, memoization per runtime config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the node for error messages and debug output.
    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enable or disable memoization, overriding the runtime default.
    pub fn memoize(mut self, memoize: bool) -> Self {
        self.memoize = Some(memoize);
        self
    }
}

struct ComputedCore<T> {
    state: ComputedState,
    value: Option<T>,
    dependencies: Vec<Subscription>,
    memo_key: Option<MemoKey>,
    // Failed since the last notification; the next upstream change is passed on.
    failed: bool,
}

struct ComputedInner<T> {
    this: Weak<ComputedInner<T>>,
    name: Option<Arc<str>>,
    memoize: bool,
    compute: ComputeFn<T>,
    core: Mutex<ComputedCore<T>>,
    listeners: Arc<Listeners>,
    recomputes: AtomicU64,
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn id(&self) -> NodeId {
        self.listeners.owner()
    }

    fn node_label(&self) -> NodeLabel {
        NodeLabel::new(self.id(), NodeKind::Computed, self.name.clone())
    }

    fn refresh(&self) -> Result<T, ReactiveError> {
        {
            let core = self.core.lock();
            if core.state == ComputedState::Clean {
                if let Some(value) = &core.value {
                    return Ok(value.clone());
                }
            }
        }
        self.recompute()
    }

    fn recompute(&self) -> Result<T, ReactiveError> {
        let label = self.node_label();
        let computing = Runtime::current().begin_computing(&label)?;

        let (previous, state) = {
            let mut core = self.core.lock();
            (std::mem::take(&mut core.dependencies), core.state)
        };
        for subscription in &previous {
            subscription.cancel();
        }

        let tracking = Tracking::enter(FrameOwner::Node(self.id()));

        if self.memoize {
            let key = MemoKey::capture(previous.iter().map(Subscription::source));
            let mut core = self.core.lock();
            let unchanged = core.memo_key.as_ref() == Some(&key);
            core.memo_key = Some(key);
            let cached = match (&core.value, state) {
                (Some(value), ComputedState::MaybeDirty) if unchanged => Some(value.clone()),
                _ => None,
            };
            drop(core);

            if let Some(value) = cached {
                drop(tracking);
                drop(computing);
                let sources = previous.into_iter().map(|s| Arc::clone(s.source()));
                let dependencies = self.subscribe(sources);
                let mut core = self.core.lock();
                core.dependencies = dependencies;
                core.state = ComputedState::Clean;
                trace!(node = %label, "memo hit, keeping cached value");
                return Ok(value);
            }
        }

        let result = (self.compute)();
        let frame = tracking.finish();
        drop(computing);
        self.recomputes.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(value) => {
                trace!(node = %label, dependencies = frame.len(), "recomputed");
                let dependencies = self.subscribe(frame.into_sources());
                let mut core = self.core.lock();
                core.dependencies = dependencies;
                core.value = Some(value.clone());
                core.state = ComputedState::Clean;
                core.failed = false;
                Ok(value)
            }
            Err(err) => {
                trace!(node = %label, error = %err, "recomputation failed");
                // Nodes in a cycle must not hold each other alive
                let dependencies = if err.is_cycle() {
                    Vec::new()
                } else {
                    self.subscribe(frame.into_sources())
                };
                let mut core = self.core.lock();
                core.dependencies = dependencies;
                core.value = None;
                core.memo_key = None;
                core.state = ComputedState::Dirty;
                core.failed = true;
                Err(err.attributed_to(&label))
            }
        }
    }

    fn subscribe<I>(&self, sources: I) -> Vec<Subscription>
    where
        I: IntoIterator<Item = Arc<dyn Source>>,
    {
        sources
            .into_iter()
            .map(|source| Subscription::dependent(source, self.change_handler()))
            .collect()
    }

    fn change_handler(&self) -> Listener {
        let this = self.this.clone();
        Arc::new(move || {
            if let Some(inner) = this.upgrade() {
                inner.mark_stale();
            }
        })
    }

    /// Push dirtiness downstream without recomputing.
    fn mark_stale(&self) {
        {
            let mut core = self.core.lock();
            match core.state {
                ComputedState::Clean => core.state = ComputedState::MaybeDirty,
                ComputedState::Dirty if core.failed => core.failed = false,
                _ => return,
            }
        }
        transaction::schedule_notification(&self.listeners);
        self.listeners.propagate();
    }

    fn unsubscribe_all(&self) {
        let dependencies = std::mem::take(&mut self.core.lock().dependencies);
        for subscription in &dependencies {
            subscription.cancel();
        }
    }
}

impl<T> Source for ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn label(&self) -> NodeLabel {
        self.node_label()
    }

    fn listeners(&self) -> &Arc<Listeners> {
        &self.listeners
    }

    fn snapshot(&self) -> Option<Snapshot> {
        untracked(|| self.refresh()).ok().map(Snapshot::new)
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        for subscription in self.core.get_mut().dependencies.drain(..) {
            subscription.cancel();
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. `PartialEq` is needed to compare
///   memo keys when another node memoizes on this one.
///
/// # Example
///
/// ```rust
/// use cellgraph_core::reactive::{Cell, Computed};
///
/// let price = Cell::new(100);
/// let qty = Cell::new(2);
/// let total = {
///     let (price, qty) = (price.clone(), qty.clone());
///     Computed::new(move || price.get() * qty.get())
/// };
///
/// assert_eq!(total.get(), 200);
/// price.set(150);
/// assert_eq!(total.get(), 300);
/// ```
pub struct Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed node from an infallible function.
    ///
    /// The function is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(ComputedOptions::default(), move || Ok(compute()))
    }

    /// Create a computed node from a fallible function.
    ///
    /// Use `?` on [`Computed::try_get`] inside the function to propagate
    /// upstream failures and cycles.
    pub fn try_new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T, ReactiveError> + Send + Sync + 'static,
    {
        Self::with_options(ComputedOptions::default(), compute)
    }

    /// Create a computed node with explicit options.
    pub fn with_options<F>(options: ComputedOptions, compute: F) -> Self
    where
        F: Fn() -> Result<T, ReactiveError> + Send + Sync + 'static,
    {
        let memoize = options
            .memoize
            .unwrap_or_else(|| Runtime::with(|runtime| runtime.config().memoize));
        let inner = Arc::new_cyclic(|this| ComputedInner {
            this: this.clone(),
            name: options.name,
            memoize,
            compute: Box::new(compute),
            core: Mutex::new(ComputedCore {
                state: ComputedState::Dirty,
                value: None,
                dependencies: Vec::new(),
                memo_key: None,
                failed: false,
            }),
            listeners: Arc::new(Listeners::new(NodeId::new())),
            recomputes: AtomicU64::new(0),
        });
        Self { inner }
    }

    /// Get the node's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    /// Get the node's label.
    pub fn label(&self) -> NodeLabel {
        self.inner.node_label()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// If called within a tracked evaluation, this node is recorded as a
    /// dependency of it.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        Runtime::with(|runtime| {
            runtime
                .tracker()
                .record(NodeKind::Computed, self.id(), || self.as_source());
        });
        self.inner.refresh()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the recomputation fails or a cycle is detected. Use
    /// [`Computed::try_get`] to handle those.
    #[track_caller]
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> Result<T, ReactiveError> {
        untracked(|| self.inner.refresh())
    }

    /// Force the next read to recompute, bypassing memoization.
    ///
    /// Dependents and listeners are notified as for an upstream change.
    pub fn invalidate(&self) {
        let notify = {
            let mut core = self.inner.core.lock();
            let notify = core.state == ComputedState::Clean || core.failed;
            core.state = ComputedState::Dirty;
            core.failed = false;
            notify
        };
        if notify {
            Transaction::run(|| {
                transaction::schedule_notification(&self.inner.listeners);
                self.inner.listeners.propagate();
            });
        }
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        self.inner.core.lock().state
    }

    /// Whether the next read will (potentially) recompute.
    pub fn is_dirty(&self) -> bool {
        self.state() != ComputedState::Clean
    }

    /// Check if the node has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.core.lock().value.is_some()
    }

    /// Whether this node memoizes on dependency values.
    pub fn is_memoized(&self) -> bool {
        self.inner.memoize
    }

    /// Labels of the dependencies recorded by the last recomputation.
    pub fn dependencies(&self) -> Vec<NodeLabel> {
        self.inner
            .core
            .lock()
            .dependencies
            .iter()
            .map(|subscription| subscription.source().label())
            .collect()
    }

    /// How many times the function has run.
    pub fn recompute_count(&self) -> u64 {
        self.inner.recomputes.load(Ordering::Relaxed)
    }

    /// Number of computed nodes and observers currently depending on this
    /// one.
    pub fn dependent_count(&self) -> usize {
        self.inner.listeners.dependent_count()
    }

    /// Unsubscribe from every dependency and drop all listeners.
    ///
    /// Safe to call more than once. Reading a disposed node is not guarded
    /// against: it recomputes and subscribes again.
    pub fn dispose(&self) {
        self.inner.unsubscribe_all();
        self.inner.listeners.clear();
    }

    pub(crate) fn as_source(&self) -> Arc<dyn Source> {
        Arc::clone(&self.inner) as Arc<dyn Source>
    }
}

impl<T> Notifiable for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn listeners(&self) -> &Arc<Listeners> {
        &self.inner.listeners
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("label", &self.label().to_string())
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("recompute_count", &self.recompute_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
