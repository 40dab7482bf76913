//! Graph Nodes
//!
//! Identity and labelling for every participant in the dependency graph.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a node in the dependency graph.
///
/// Cells, computed nodes and observers all draw from the same counter, so an
/// id is enough to key pending notifications and tracker frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A source node (cell). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Cell,

    /// A derived node. These have dependencies and may have dependents.
    /// They cache their computed value.
    Computed,

    /// An external consumer. These are leaves of the graph.
    Observer,
}

impl NodeKind {
    fn as_str(self) -> &'static str {
        match self {
            NodeKind::Cell => "cell",
            NodeKind::Computed => "computed",
            NodeKind::Observer => "observer",
        }
    }
}

/// Human-readable identity of a node, used in errors and debug output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeLabel {
    id: NodeId,
    kind: NodeKind,
    name: Option<Arc<str>>,
}

impl NodeLabel {
    /// Create a label for the given node.
    pub fn new(id: NodeId, kind: NodeKind, name: Option<Arc<str>>) -> Self {
        Self { id, kind, name }
    }

    /// The node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The user-supplied name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}#{}", self.id),
            None => write!(f, "{}#{}", self.kind.as_str(), self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
        assert!(id2.raw() > id1.raw());
    }

    #[test]
    fn label_prefers_name() {
        let id = NodeId::from(7);
        let named = NodeLabel::new(id, NodeKind::Computed, Some(Arc::from("total")));
        let anonymous = NodeLabel::new(id, NodeKind::Computed, None);

        assert_eq!(named.to_string(), "total#7");
        assert_eq!(anonymous.to_string(), "computed#7");
        assert_eq!(named.name(), Some("total"));
        assert_eq!(anonymous.kind(), NodeKind::Computed);
    }
}
