//! Reactive Primitives
//!
//! This module implements the reactive engine: cells, computed nodes,
//! transactions and the hooks external consumers use to join dependency
//! tracking.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] is a container for mutable state. When a cell's value is read
//! within a tracked evaluation, the cell registers itself as a dependency of
//! that evaluation. When the value changes, dependents are marked dirty and
//! listeners are notified.
//!
//! ## Computed Nodes
//!
//! A [`Computed`] is a derived value that caches its result. Changes upstream
//! mark it dirty eagerly ("push dirty"); it recomputes lazily on the next
//! read ("pull value"), re-deriving its dependency set every time.
//!
//! ## Transactions
//!
//! [`Transaction::run`] batches writes. Listeners fire once per changed
//! entity, after the outermost transaction exits and every write is visible.
//!
//! ## Observers and Effects
//!
//! An [`Observer`] lets external code (a UI rebuild boundary, a logger)
//! track what it reads and get called back when any of it changes. An
//! [`Effect`] is an observer that simply re-runs its body.
//!
//! # Implementation Notes
//!
//! Dependency tracking goes through a per-thread [`Runtime`] holding a stack
//! of tracker frames. Reading a cell or computed node checks the top frame
//! and records itself there, so nothing has to be declared up front.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod cell;
mod computed;
mod effect;
mod listener;
mod memo;
mod observer;
mod runtime;
mod source;
mod tracker;
mod transaction;

pub use cell::Cell;
pub use computed::{Computed, ComputedOptions, ComputedState};
pub use effect::Effect;
pub use listener::{Listener, ListenerId, Listeners, Notifiable};
pub use memo::Snapshot;
pub use observer::Observer;
pub use runtime::{Runtime, RuntimeGuard};
pub use source::Source;
pub use tracker::{is_tracking, untracked, FrameOwner, TrackerFrame, TrackerStack, Tracking};
pub use transaction::{run_in_transaction, schedule_notification, Transaction};
