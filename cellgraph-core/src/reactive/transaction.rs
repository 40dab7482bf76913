//! Transactions
//!
//! A transaction batches writes: cells are updated immediately, but their
//! listeners are only notified once the outermost transaction exits. Each
//! entity is queued at most once, so N writes to the same cell produce one
//! notification, delivered after every write is visible.
//!
//! # Flushing
//!
//! A flush takes the whole pending set as one notification cycle and
//! delivers it in the order entities were first queued. Every queued entity
//! is delivered, however many there are.
//!
//! A write outside any transaction runs as an implicit one-write
//! transaction, so its listeners still run before the write returns. That
//! holds inside a listener too: a write there starts a fresh cycle nested in
//! the one being delivered, and only an explicit [`Transaction::run`] in the
//! listener defers delivery to its own exit. Nesting deeper than
//! [`RuntimeConfig::max_flush_depth`](crate::RuntimeConfig::max_flush_depth)
//! means listeners keep re-triggering each other; the cycle that would
//! exceed it is dropped and logged.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error, trace, warn};

use super::listener::Listeners;
use super::runtime::Runtime;
use crate::graph::NodeId;

type Queue = IndexMap<NodeId, Arc<Listeners>>;

/// Nesting depth and pending notifications of one runtime.
#[derive(Default)]
pub(crate) struct BatchState {
    depth: Cell<usize>,
    flush_depth: Cell<usize>,
    pending: RefCell<Queue>,
}

impl BatchState {
    fn enter(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    fn exit(&self) -> usize {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        depth
    }

    fn is_batching(&self) -> bool {
        self.depth.get() > 0
    }

    fn enqueue(&self, entity: &Arc<Listeners>) {
        self.pending
            .borrow_mut()
            .entry(entity.owner())
            .or_insert_with(|| Arc::clone(entity));
    }

    /// Deliver everything pending as one notification cycle.
    fn flush(&self, max_depth: usize) {
        let queue = std::mem::take(&mut *self.pending.borrow_mut());
        if queue.is_empty() {
            return;
        }

        let depth = self.flush_depth.get() + 1;
        if depth > max_depth {
            error!(
                max_depth,
                dropped = queue.len(),
                "notification cycles nested too deep; listeners keep re-triggering each other"
            );
            return;
        }

        self.flush_depth.set(depth);
        let mut cycle = Cycle {
            batch: self,
            queue,
            delivered: 0,
        };

        while let Some((id, entity)) = cycle.next() {
            trace!(entity = %id, depth, "delivering notification");
            entity.notify_callbacks();
        }

        debug!(delivered = cycle.delivered, depth, "flush complete");
    }
}

impl fmt::Debug for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchState")
            .field("depth", &self.depth.get())
            .field("flush_depth", &self.flush_depth.get())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

/// One running notification cycle. Restores the flush depth when dropped;
/// entities still queued at that point were cut off by a panicking listener.
struct Cycle<'a> {
    batch: &'a BatchState,
    queue: Queue,
    delivered: usize,
}

impl Cycle<'_> {
    fn next(&mut self) -> Option<(NodeId, Arc<Listeners>)> {
        let (id, entity) = self.queue.get_index(self.delivered)?;
        self.delivered += 1;
        Some((*id, Arc::clone(entity)))
    }
}

impl Drop for Cycle<'_> {
    fn drop(&mut self) {
        let depth = self.batch.flush_depth.get();
        self.batch.flush_depth.set(depth.saturating_sub(1));
        let remaining = self.queue.len() - self.delivered;
        if remaining > 0 {
            warn!(dropped = remaining, "discarding notifications after listener panic");
        }
    }
}

/// Decrements the depth when dropped and flushes at depth zero.
struct TransactionGuard {
    runtime: Rc<Runtime>,
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        let batch = self.runtime.batch();
        if batch.exit() == 0 {
            if std::thread::panicking() {
                debug!("flushing notifications while unwinding");
            }
            batch.flush(self.runtime.config().max_flush_depth);
        }
    }
}

/// Entry point for batched writes.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use cellgraph_core::reactive::{Cell, Notifiable, Transaction};
///
/// let x = Cell::new(0);
/// let calls = Arc::new(AtomicUsize::new(0));
/// let calls_clone = calls.clone();
/// x.add_listener(move || {
///     calls_clone.fetch_add(1, Ordering::SeqCst);
/// });
///
/// Transaction::run(|| {
///     x.set(1);
///     x.set(2);
///     x.set(3);
/// });
///
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Transaction;

impl Transaction {
    /// Run `f` as a transaction and return its result.
    ///
    /// Nested calls only increase the depth; the outermost call flushes. The
    /// depth is restored and the flush still happens if `f` panics, so
    /// notifications for writes applied before the failure are not lost.
    ///
    /// That flush runs while the panic unwinds. A listener that panics
    /// during it aborts the process, so listeners reached from a panicking
    /// transaction must not panic themselves.
    pub fn run<R>(f: impl FnOnce() -> R) -> R {
        let runtime = Runtime::current();
        runtime.batch().enter();
        let _guard = TransactionGuard { runtime };
        f()
    }

    /// Whether a transaction is open on this thread.
    pub fn is_active() -> bool {
        Self::depth() > 0
    }

    /// Current nesting depth.
    pub fn depth() -> usize {
        Runtime::with(|runtime| runtime.batch().depth.get())
    }

    /// Number of entities waiting for delivery.
    pub fn pending_count() -> usize {
        Runtime::with(|runtime| runtime.batch().pending.borrow().len())
    }
}

/// Run `f` as a transaction. See [`Transaction::run`].
pub fn run_in_transaction<R>(f: impl FnOnce() -> R) -> R {
    Transaction::run(f)
}

/// Deliver `entity`'s callbacks now, or queue them if a transaction is open.
/// Queuing the same entity twice delivers it once.
pub fn schedule_notification(entity: &Arc<Listeners>) {
    Runtime::with(|runtime| {
        let batch = runtime.batch();
        batch.enqueue(entity);
        if !batch.is_batching() {
            batch.flush(runtime.config().max_flush_depth);
        }
    });
}
