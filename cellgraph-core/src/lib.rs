//! Cellgraph Core
//!
//! This crate provides a fine-grained reactive state engine. It implements:
//!
//! - Observable cells holding mutable state
//! - Computed nodes that recompute lazily when their inputs change
//! - Transactions that batch writes into a single notification pass
//! - Observers that let external consumers join dependency tracking
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Cells, computed nodes, transactions and dependency tracking
//! - `graph`: Node identity shared across the dependency graph
//! - `error`: The error type surfaced when a value is demanded
//! - `config`: Runtime configuration
//!
//! # Example
//!
//! ```rust
//! use cellgraph_core::reactive::{Cell, Computed, Notifiable, Transaction};
//!
//! // Create cells
//! let price = Cell::new(100);
//! let qty = Cell::new(2);
//!
//! // Create a derived value
//! let total = {
//!     let (price, qty) = (price.clone(), qty.clone());
//!     Computed::new(move || price.get() * qty.get())
//! };
//! assert_eq!(total.get(), 200);
//!
//! // Listen for changes
//! let watched = total.clone();
//! total.add_listener(move || println!("total: {}", watched.get()));
//!
//! // Batch updates: the listener runs once, prints "total: 50"
//! Transaction::run(|| {
//!     price.set(10);
//!     qty.set(5);
//! });
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::RuntimeConfig;
pub use error::ReactiveError;
