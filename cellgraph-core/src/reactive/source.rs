//! Type-erased view of anything that can be read as a dependency.

use std::sync::Arc;

use super::listener::{Listener, ListenerId, Listeners};
use super::memo::Snapshot;
use crate::graph::{NodeId, NodeLabel};

/// A readable reactive entity as seen by tracker frames and dependents.
pub trait Source: Send + Sync {
    /// The entity's label.
    fn label(&self) -> NodeLabel;

    /// The entity's listener list.
    fn listeners(&self) -> &Arc<Listeners>;

    /// A copy of the current value for memo keys, without recording a
    /// dependency. `None` if no value can be produced right now.
    fn snapshot(&self) -> Option<Snapshot>;

    /// The entity's ID.
    fn node_id(&self) -> NodeId {
        self.listeners().owner()
    }
}

/// A registration of one listener on one source.
///
/// Dropping a subscription does not cancel it; call [`Subscription::cancel`].
pub(crate) struct Subscription {
    source: Arc<dyn Source>,
    id: ListenerId,
}

impl Subscription {
    /// Install `listener` as a dependent of `source`.
    pub(crate) fn dependent(source: Arc<dyn Source>, listener: Listener) -> Self {
        let id = source.listeners().add_dependent(listener);
        Self { source, id }
    }

    pub(crate) fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub(crate) fn cancel(&self) {
        self.source.listeners().remove(self.id);
    }
}
