//! Dependency Tracker
//!
//! The tracker stack records which computation is currently running.
//! This enables automatic dependency tracking: when a cell or computed node
//! is read, it registers itself in the frame on top of the stack.
//!
//! # Implementation
//!
//! Each [`Runtime`] owns one stack. When entering a tracked evaluation
//! (a computed node recomputing, an observer running its body) we push a
//! frame; when it completes, we pop it. Nested evaluation pushes a new frame,
//! so each level only captures its own direct dependencies.
//!
//! Frames are pushed and popped through the [`Tracking`] guard, which pops
//! on drop so the stack stays balanced when the tracked function panics.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use super::runtime::Runtime;
use super::source::Source;
use crate::graph::{NodeId, NodeKind};

/// Who a tracker frame collects dependencies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOwner {
    /// A computed node or observer.
    Node(NodeId),

    /// An [`untracked`] scope. Reads are collected and thrown away.
    Detached,
}

/// Dependencies collected while one frame was on top of the stack.
///
/// Each dependency is recorded once, in first-read order.
pub struct TrackerFrame {
    owner: FrameOwner,
    cells: IndexMap<NodeId, Arc<dyn Source>>,
    computeds: IndexMap<NodeId, Arc<dyn Source>>,
}

impl TrackerFrame {
    fn new(owner: FrameOwner) -> Self {
        Self {
            owner,
            cells: IndexMap::new(),
            computeds: IndexMap::new(),
        }
    }

    /// The frame's owner.
    pub fn owner(&self) -> FrameOwner {
        self.owner
    }

    /// IDs of the cells read in this frame.
    pub fn cells(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.cells.keys().copied()
    }

    /// IDs of the computed nodes read in this frame.
    pub fn computeds(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.computeds.keys().copied()
    }

    /// Total number of recorded dependencies.
    pub fn len(&self) -> usize {
        self.cells.len() + self.computeds.len()
    }

    /// Whether nothing was read.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the frame, cells first, then computed nodes.
    pub(crate) fn into_sources(self) -> Vec<Arc<dyn Source>> {
        self.cells
            .into_values()
            .chain(self.computeds.into_values())
            .collect()
    }
}

impl fmt::Debug for TrackerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerFrame")
            .field("owner", &self.owner)
            .field("cells", &self.cells.keys().collect::<Vec<_>>())
            .field("computeds", &self.computeds.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A last-in-first-out stack of tracker frames.
#[derive(Default)]
pub struct TrackerStack {
    frames: RefCell<Vec<TrackerFrame>>,
}

impl TrackerStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new, empty frame.
    pub fn push(&self, owner: FrameOwner) {
        self.frames.borrow_mut().push(TrackerFrame::new(owner));
    }

    /// Pop the top frame.
    pub fn pop(&self) -> Option<TrackerFrame> {
        self.frames.borrow_mut().pop()
    }

    /// Owner of the top frame, if any frame is active.
    pub fn current(&self) -> Option<FrameOwner> {
        self.frames.borrow().last().map(|frame| frame.owner)
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Whether reads are currently being recorded.
    pub fn is_tracking(&self) -> bool {
        !self.frames.borrow().is_empty()
    }

    /// Record a read of `id` in the top frame.
    ///
    /// `source` is only called when a frame is active and the dependency is
    /// not yet recorded.
    pub(crate) fn record<F>(&self, kind: NodeKind, id: NodeId, source: F)
    where
        F: FnOnce() -> Arc<dyn Source>,
    {
        let mut frames = self.frames.borrow_mut();
        let Some(frame) = frames.last_mut() else {
            return;
        };
        let set = match kind {
            NodeKind::Computed => &mut frame.computeds,
            // Observers are never read
            _ => &mut frame.cells,
        };
        set.entry(id).or_insert_with(source);
    }
}

impl fmt::Debug for TrackerStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerStack")
            .field("depth", &self.depth())
            .field("current", &self.current())
            .finish()
    }
}

/// Guard that pops its frame when dropped.
///
/// This ensures the stack is properly maintained even if the tracked
/// computation panics.
pub struct Tracking {
    runtime: Rc<Runtime>,
    owner: FrameOwner,
    finished: bool,
}

impl Tracking {
    /// Push a frame for `owner` onto the current runtime's stack.
    ///
    /// While the guard is alive, reads register in that frame.
    pub fn enter(owner: FrameOwner) -> Self {
        let runtime = Runtime::current();
        runtime.tracker().push(owner);
        Self {
            runtime,
            owner,
            finished: false,
        }
    }

    /// Pop the frame and return what it collected.
    pub fn finish(mut self) -> TrackerFrame {
        self.finished = true;
        self.pop_own()
            .unwrap_or_else(|| TrackerFrame::new(self.owner))
    }

    fn pop_own(&self) -> Option<TrackerFrame> {
        let popped = self.runtime.tracker().pop();

        // Verify we're popping the right frame.
        // This helps catch bugs where frames are mismatched.
        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.owner, self.owner,
                "tracker frame mismatch: expected {:?}, got {:?}",
                self.owner, frame.owner
            );
        }
        popped
    }
}

impl Drop for Tracking {
    fn drop(&mut self) {
        if !self.finished {
            self.pop_own();
        }
    }
}

/// Run `f` without recording its reads as dependencies of the enclosing
/// computation.
///
/// ```rust
/// use cellgraph_core::reactive::{untracked, Cell, Computed};
///
/// let a = Cell::new(1);
/// let b = Cell::new(10);
/// let sum = {
///     let (a, b) = (a.clone(), b.clone());
///     Computed::new(move || a.get() + untracked(|| b.get()))
/// };
///
/// assert_eq!(sum.get(), 11);
/// b.set(20);
/// assert!(!sum.is_dirty());
/// ```
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _frame = Tracking::enter(FrameOwner::Detached);
    f()
}

/// Whether a tracked evaluation is running on the current runtime.
pub fn is_tracking() -> bool {
    Runtime::with(|runtime| runtime.tracker().is_tracking())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Cell, Computed};

    #[test]
    fn stack_tracks_owner() {
        let id = NodeId::new();

        assert!(!is_tracking());

        {
            let _frame = Tracking::enter(FrameOwner::Node(id));

            assert!(is_tracking());
            let current = Runtime::with(|rt| rt.tracker().current());
            assert_eq!(current, Some(FrameOwner::Node(id)));
        }

        // Frame should be cleaned up after drop
        assert!(!is_tracking());
    }

    #[test]
    fn frame_collects_reads_once() {
        let a = Cell::new(1);
        let b = Cell::new(2);

        let frame = Tracking::enter(FrameOwner::Node(NodeId::new()));
        a.get();
        b.get();
        a.get();
        let frame = frame.finish();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame.cells().collect::<Vec<_>>(), vec![a.id(), b.id()]);
        assert_eq!(frame.computeds().count(), 0);
    }

    #[test]
    fn frame_files_reads_by_kind() {
        let cell = Cell::new(1);
        let doubled = {
            let cell = cell.clone();
            Computed::new(move || cell.get() * 2)
        };

        let frame = Tracking::enter(FrameOwner::Node(NodeId::new()));
        doubled.get();
        cell.get();
        let frame = frame.finish();

        assert_eq!(frame.computeds().collect::<Vec<_>>(), vec![doubled.id()]);
        assert_eq!(frame.cells().collect::<Vec<_>>(), vec![cell.id()]);
    }

    #[test]
    fn nested_frames_capture_own_reads() {
        let outer_cell = Cell::new(1);
        let inner_cell = Cell::new(2);
        let outer_id = NodeId::new();
        let inner_id = NodeId::new();

        let outer = Tracking::enter(FrameOwner::Node(outer_id));
        outer_cell.get();

        {
            let inner = Tracking::enter(FrameOwner::Node(inner_id));
            inner_cell.get();
            let inner = inner.finish();
            assert_eq!(inner.cells().collect::<Vec<_>>(), vec![inner_cell.id()]);
        }

        // Back to outer frame, should see outer reads only
        let outer = outer.finish();
        assert_eq!(outer.owner(), FrameOwner::Node(outer_id));
        assert_eq!(outer.cells().collect::<Vec<_>>(), vec![outer_cell.id()]);
    }

    #[test]
    fn untracked_reads_are_not_recorded() {
        let a = Cell::new(1);
        let b = Cell::new(2);

        let frame = Tracking::enter(FrameOwner::Node(NodeId::new()));
        a.get();
        untracked(|| b.get());
        let frame = frame.finish();

        assert_eq!(frame.cells().collect::<Vec<_>>(), vec![a.id()]);
    }

    #[test]
    fn frame_is_popped_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _frame = Tracking::enter(FrameOwner::Node(NodeId::new()));
            panic!("tracked function failed");
        });

        assert!(result.is_err());
        assert!(!is_tracking());
    }

    #[test]
    fn reads_outside_frames_are_ignored() {
        let stack = TrackerStack::new();
        let cell = Cell::new(0);
        let source = cell.as_source();
        stack.record(NodeKind::Cell, cell.id(), || source);
        assert_eq!(stack.depth(), 0);
        assert!(stack.pop().is_none());
    }
}
