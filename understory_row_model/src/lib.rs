// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_row_model --heading-base-level=0

//! Understory Row Model: a hierarchical client-side row model for data grids.
//!
//! The row model turns caller records into the ordered sequence of rows a grid
//! renders. It owns a tree of nodes and maintains it through a fixed pipeline:
//!
//! - **Node manager**: builds the tree from flat or nested input and reconciles it
//!   with the previous one by row id, so expansion and selection survive reloads.
//! - **Grouping**: synthesizes filler groups over flat input from a list of fields.
//! - **Filter**: marks nodes as passing, passing via a descendant, or failing.
//! - **Aggregation**: computes per-group aggregates bottom-up.
//! - **Sort**: orders siblings at every level.
//! - **Flatten**: produces the display sequence with dense display indices.
//!
//! Every mutation is classified as a [`ChangeKind`], which selects the minimal set
//! of stages to re-run. Transactions carry a [`ChangedPath`] so each stage only
//! revisits the ancestor chains of the rows that changed.
//!
//! Records are read through the [`RowData`] trait; [`MapRow`] is a ready-made
//! dynamic record.
//!
//! # Example
//!
//! ```rust
//! use understory_row_model::{
//!     AggFunc, AggregationModel, MapRow, RowModel, RowModelOptions, RowTransaction, SortKey,
//!     SortModel, Value,
//! };
//!
//! let mut model = RowModel::with_row_id(
//!     RowModelOptions::tree_data().with_group_default_expanded(-1),
//!     |r: &MapRow| r.value_str("id").into(),
//! );
//! model.set_aggregation_model(AggregationModel::new().with("v", AggFunc::Sum));
//! model.set_sort_model(SortModel::new().with(SortKey::desc("v")));
//!
//! let b = MapRow::new().with("id", "B").with("v", 2).shared();
//! let a = MapRow::new().with("id", "A").with("v", 1).with_children([b]).shared();
//! model.set_row_data([a]);
//! assert_eq!(model.row_node("A").unwrap().aggregate("v"), Some(&Value::Int(2)));
//!
//! // Only the chain from the new row up to the root is recomputed.
//! let c = MapRow::new().with("id", "C").with("v", 10).shared();
//! model.apply_transaction(RowTransaction::new().add(c).under("A"));
//!
//! let order: Vec<_> = model.rows().map(|r| r.id().to_string()).collect();
//! assert_eq!(order, ["A", "C", "B"]);
//! assert_eq!(model.row_node("A").unwrap().aggregate("v"), Some(&Value::Int(12)));
//! ```
//!
//! ## Diagnostics
//!
//! Recoverable problems (duplicate ids, unknown rows in transactions, missing
//! fields, failing callbacks) never abort a pipeline run. They are logged through
//! `tracing` and buffered as [`Warning`]s, see [`RowModel::take_warnings`].
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod aggregation;
pub mod change;
mod context;
pub mod data;
pub mod error;
pub mod events;
pub mod filter;
mod flatten;
pub mod grouping;
pub mod model;
pub mod node;
pub mod node_manager;
pub mod options;
pub mod sort;
mod tree;
pub mod types;
pub mod value;

#[cfg(test)]
mod proptests;

pub use aggregation::{AggCallback, AggFunc, AggregationModel};
pub use change::{ChangeKind, ChangedPath, Stages};
pub use data::{MapRow, RowData};
pub use error::{
    CallbackError, InvariantViolation, Result, RowModelError, RowOp, StageName, Warning, Warnings,
};
pub use events::{ListenerId, ModelEvent, ModelUpdated};
pub use filter::{FilterModel, Predicate, PredicateCallback};
pub use model::{ModelState, PipelineStats, RowModel};
pub use node::RowNode;
pub use node_manager::{RowIdFn, RowRef, RowTransaction, TransactionResult};
pub use options::RowModelOptions;
pub use sort::{SortCallback, SortDirection, SortKey, SortModel};
pub use types::{DisplayState, FilterState, NodeFlags, NodeId, RowBounds, RowId};
pub use value::Value;
