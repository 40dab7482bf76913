//! Error types for the reactive engine.

use std::sync::Arc;

use thiserror::Error;

use crate::graph::NodeLabel;

/// Boxed error raised by a user-supplied computation.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced when a value is demanded from the graph.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A computed node was re-entered while it was already computing.
    ///
    /// The chain starts and ends with the re-entered node.
    #[error("cycle detected: {}", format_chain(.chain))]
    Cycle { chain: Vec<NodeLabel> },

    /// A computation function failed.
    #[error("computation of {} failed: {source}", format_node(.node))]
    Failed {
        node: Option<NodeLabel>,
        #[source]
        source: BoxError,
    },

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl ReactiveError {
    /// Wrap a user error raised inside a computation.
    ///
    /// The node is filled in by the first computed node the error passes
    /// through.
    pub fn failed<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed {
            node: None,
            source: Arc::new(error),
        }
    }

    /// Wrap a plain message as a computation failure.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::failed(Message(message.into()))
    }

    /// Whether this error reports a dependency cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    /// Attribute an unattributed failure to `node`.
    pub(crate) fn attributed_to(self, node: &NodeLabel) -> Self {
        match self {
            Self::Failed { node: None, source } => Self::Failed {
                node: Some(node.clone()),
                source,
            },
            other => other,
        }
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

fn format_chain(chain: &[NodeLabel]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_node(node: &Option<NodeLabel>) -> String {
    node.as_ref()
        .map_or_else(|| "<unknown>".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeId, NodeKind};

    fn label(id: u64, name: &str) -> NodeLabel {
        NodeLabel::new(NodeId::from(id), NodeKind::Computed, Some(Arc::from(name)))
    }

    #[test]
    fn cycle_message_names_chain() {
        let err = ReactiveError::Cycle {
            chain: vec![label(1, "a"), label(2, "b"), label(1, "a")],
        };
        assert!(err.is_cycle());
        assert_eq!(err.to_string(), "cycle detected: a#1 -> b#2 -> a#1");
    }

    #[test]
    fn failure_is_attributed_once() {
        let err = ReactiveError::msg("boom")
            .attributed_to(&label(3, "inner"))
            .attributed_to(&label(4, "outer"));
        assert_eq!(err.to_string(), "computation of inner#3 failed: boom");
    }

    #[test]
    fn unattributed_failure_message() {
        let err = ReactiveError::msg("boom");
        assert_eq!(err.to_string(), "computation of <unknown> failed: boom");
        assert!(!err.is_cycle());
    }
}
