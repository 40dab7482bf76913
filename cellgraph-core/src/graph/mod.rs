//! Dependency Graph
//!
//! Node identity shared by every participant in the reactive graph.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent reactive values (cells) or computations (computed nodes,
//!   observers)
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//!
//! The graph is not stored centrally. Each node keeps its own listener list
//! and its own recorded dependencies, and edges are re-derived on every
//! recomputation. This module only provides the identity types those
//! distributed pieces agree on.

mod node;

pub use node::{NodeId, NodeKind, NodeLabel};
