//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs when the transaction
//!    making the change flushes, so a transaction that touches several
//!    dependencies causes a single re-run.
//!
//! 3. Every run re-derives the dependency set through an [`Observer`].
//!
//! # Differences from Computed
//!
//! - Computed nodes return a value; effects do not.
//! - Computed nodes are lazy (compute on access); effects are eager (run
//!   when deps change).
//! - Computed nodes cache results; effects just run their side effect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::observer::Observer;

struct EffectInner {
    observer: Observer,
    run: Box<dyn Fn() + Send + Sync>,
    disposed: AtomicBool,
    run_count: AtomicU64,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.observer.track(|| (self.run)());
        self.run_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use cellgraph_core::reactive::{Cell, Effect};
///
/// let count = Cell::new(0);
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let _effect = {
///     let (count, seen) = (count.clone(), seen.clone());
///     Effect::new(move || seen.lock().push(count.get()))
/// };
///
/// count.set(5);
/// assert_eq!(*seen.lock(), vec![0, 5]);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies until [`Effect::execute`] is called.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this: &Weak<EffectInner>| {
            let this = this.clone();
            let observer = Observer::build(
                None,
                Arc::new(move || {
                    if let Some(inner) = this.upgrade() {
                        inner.execute();
                    }
                }),
            );
            EffectInner {
                observer,
                run: Box::new(run),
                disposed: AtomicBool::new(false),
                run_count: AtomicU64::new(0),
            }
        });
        Self { inner }
    }

    /// Run the effect function now, re-deriving its dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Stop the effect. It unsubscribes and never runs again.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.observer.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> u64 {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.observer.dependency_count()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.observer.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
