//! Reactive Runtime
//!
//! The runtime is the per-thread context that connects cells, computed nodes
//! and consumers. It owns:
//!
//! - the [`TrackerStack`] that attributes reads to the running evaluation
//! - the "currently computing" chain used for cycle detection
//! - the transaction state (nesting depth and pending notifications)
//!
//! # Injection
//!
//! Every thread starts with a default runtime. Tests and embedders can build
//! independent runtimes with [`Runtime::new`] and install one for a scope
//! with [`Runtime::enter`] or [`Runtime::run`], so nothing is shared through
//! hidden process state.
//!
//! # Thread Safety
//!
//! Cell and computed values are `Send + Sync`, but a runtime is confined to
//! the thread that created it. Tracking, cycle detection and batching are
//! therefore per thread; a write from another thread notifies on that thread.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use super::tracker::TrackerStack;
use super::transaction::BatchState;
use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeLabel};

thread_local! {
    static CURRENT: RefCell<Rc<Runtime>> = RefCell::new(Rc::new(Runtime::build(RuntimeConfig::default())));
}

/// State shared by every reactive operation on one thread.
pub struct Runtime {
    config: RuntimeConfig,
    tracker: TrackerStack,
    computing: RefCell<IndexMap<NodeId, NodeLabel>>,
    batch: BatchState,
}

impl Runtime {
    fn build(config: RuntimeConfig) -> Self {
        Self {
            config,
            tracker: TrackerStack::new(),
            computing: RefCell::new(IndexMap::new()),
            batch: BatchState::default(),
        }
    }

    /// Create an independent runtime.
    ///
    /// It is not used until installed with [`Runtime::enter`] or
    /// [`Runtime::run`].
    pub fn new(config: RuntimeConfig) -> Rc<Self> {
        Rc::new(Self::build(config))
    }

    /// The runtime installed on this thread.
    pub fn current() -> Rc<Self> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Run `f` against the current runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Rc<Self>) -> R) -> R {
        let runtime = Self::current();
        f(&runtime)
    }

    /// Install this runtime on the current thread until the guard drops.
    pub fn enter(self: &Rc<Self>) -> RuntimeGuard {
        let previous = CURRENT.with(|current| current.replace(Rc::clone(self)));
        RuntimeGuard {
            previous: Some(previous),
        }
    }

    /// Run `f` with this runtime installed.
    pub fn run<R>(self: &Rc<Self>, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// The runtime's configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The dependency tracker stack.
    pub fn tracker(&self) -> &TrackerStack {
        &self.tracker
    }

    pub(crate) fn batch(&self) -> &BatchState {
        &self.batch
    }

    /// Labels of the computed nodes currently recomputing, outermost first.
    pub fn computing(&self) -> Vec<NodeLabel> {
        self.computing.borrow().values().cloned().collect()
    }

    /// Mark `label` as computing.
    ///
    /// Fails with [`ReactiveError::Cycle`] if it is already computing. The
    /// returned guard removes it again when dropped.
    pub(crate) fn begin_computing(
        self: &Rc<Self>,
        label: &NodeLabel,
    ) -> Result<ComputingGuard, ReactiveError> {
        let mut computing = self.computing.borrow_mut();
        if let Some(start) = computing.get_index_of(&label.id()) {
            let mut chain: Vec<NodeLabel> = computing.values().skip(start).cloned().collect();
            chain.push(label.clone());
            debug!(node = %label, depth = chain.len() - 1, "cycle detected");
            return Err(ReactiveError::Cycle { chain });
        }
        computing.insert(label.id(), label.clone());
        Ok(ComputingGuard {
            runtime: Rc::clone(self),
            id: label.id(),
        })
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::build(RuntimeConfig::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .field("computing", &self.computing.borrow().len())
            .field("batch", &self.batch)
            .finish()
    }
}

/// Restores the previously installed runtime when dropped.
pub struct RuntimeGuard {
    previous: Option<Rc<Runtime>>,
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CURRENT.with(|current| *current.borrow_mut() = previous);
        }
    }
}

/// Removes a node from the computing chain when dropped.
pub(crate) struct ComputingGuard {
    runtime: Rc<Runtime>,
    id: NodeId,
}

impl Drop for ComputingGuard {
    fn drop(&mut self) {
        self.runtime.computing.borrow_mut().shift_remove(&self.id);
    }
}
