// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change descriptors and the stage dispatch table.
//!
//! Every mutation of the row model is classified as one [`ChangeKind`]. The kind
//! selects the minimal set of pipeline [`Stages`] to re-run ([`ChangeKind::stages`]),
//! and transactions additionally carry a [`ChangedPath`] that bounds the work of
//! each stage to the dirtied ancestor chains.

use alloc::vec::Vec;
use hashbrown::HashSet;

use crate::tree::Tree;
use crate::types::NodeId;

bitflags::bitflags! {
    /// Pipeline stages, in execution order.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Stages: u8 {
        /// Filler group derivation.
        const GROUP     = 0b0000_0001;
        /// Predicate evaluation and visibility propagation.
        const FILTER    = 0b0000_0010;
        /// Bottom-up aggregates.
        const AGGREGATE = 0b0000_0100;
        /// Per-level sibling ordering.
        const SORT      = 0b0000_1000;
        /// Display sequence.
        const FLATTEN   = 0b0001_0000;
    }
}

/// Classification of a mutation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// [`RowModel::set_row_data`](crate::RowModel::set_row_data).
    FullReplace,
    /// Add/remove/update applied against the live tree.
    Transaction,
    /// New sort model.
    SortModelChanged,
    /// New filter model.
    FilterModelChanged,
    /// New grouping fields.
    GroupModelChanged,
    /// A group was expanded or collapsed.
    ExpansionChanged,
    /// New aggregation model or aggregation options.
    AggregationConfigChanged,
}

impl ChangeKind {
    /// Every kind, for exhaustive iteration.
    pub const ALL: [Self; 7] = [
        Self::FullReplace,
        Self::Transaction,
        Self::SortModelChanged,
        Self::FilterModelChanged,
        Self::GroupModelChanged,
        Self::ExpansionChanged,
        Self::AggregationConfigChanged,
    ];

    /// Stages that must re-run after this kind of change.
    ///
    /// Aggregation runs before sorting so group rows can order on fresh aggregates;
    /// a sort change therefore never needs re-aggregation.
    pub const fn stages(self) -> Stages {
        match self {
            Self::FullReplace | Self::Transaction | Self::GroupModelChanged => Stages::all(),
            Self::FilterModelChanged => Stages::FILTER
                .union(Stages::AGGREGATE)
                .union(Stages::SORT)
                .union(Stages::FLATTEN),
            Self::AggregationConfigChanged => Stages::AGGREGATE
                .union(Stages::SORT)
                .union(Stages::FLATTEN),
            Self::SortModelChanged => Stages::SORT.union(Stages::FLATTEN),
            Self::ExpansionChanged => Stages::FLATTEN,
        }
    }
}

/// A change descriptor threaded through the pipeline.
#[derive(Clone, Debug)]
pub(crate) enum Change {
    FullReplace,
    Transaction(ChangedPath),
    SortModelChanged,
    FilterModelChanged,
    GroupModelChanged,
    ExpansionChanged,
    AggregationConfigChanged,
}

impl Change {
    pub(crate) fn kind(&self) -> ChangeKind {
        match self {
            Self::FullReplace => ChangeKind::FullReplace,
            Self::Transaction(_) => ChangeKind::Transaction,
            Self::SortModelChanged => ChangeKind::SortModelChanged,
            Self::FilterModelChanged => ChangeKind::FilterModelChanged,
            Self::GroupModelChanged => ChangeKind::GroupModelChanged,
            Self::ExpansionChanged => ChangeKind::ExpansionChanged,
            Self::AggregationConfigChanged => ChangeKind::AggregationConfigChanged,
        }
    }

    /// The bounded scope, or `None` when stages must cover the whole tree.
    pub(crate) fn changed_path(&self) -> Option<&ChangedPath> {
        match self {
            Self::Transaction(path) => Some(path),
            _ => None,
        }
    }
}

/// Set of nodes whose subtree content changed, closed under "parent of".
///
/// Stages consult it to decide which nodes to revisit: a node outside the path
/// keeps the state computed by the previous run.
#[derive(Clone, Debug, Default)]
pub struct ChangedPath {
    nodes: HashSet<NodeId>,
}

impl ChangedPath {
    /// Create an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes on the path.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if nothing is dirty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` lies on the path.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Union another path into this one.
    pub fn merge(&mut self, other: Self) {
        self.nodes.extend(other.nodes);
    }

    /// Mark `id` and its whole ancestor chain.
    ///
    /// `id` may already be present under a previous parent, so the walk always
    /// starts; it stops at the first ancestor already on the path.
    pub(crate) fn add_with_ancestors<R>(&mut self, tree: &Tree<R>, id: NodeId) {
        if !tree.is_alive(id) {
            return;
        }
        self.nodes.insert(id);
        for a in tree.ancestors(id) {
            if !self.nodes.insert(a) {
                break;
            }
        }
    }

    /// Live nodes on the path, deepest first.
    pub(crate) fn bottom_up<R>(&self, tree: &Tree<R>) -> Vec<NodeId> {
        let mut out: Vec<(u32, NodeId)> = self
            .nodes
            .iter()
            .filter_map(|&id| tree.get(id).map(|n| (n.depth, id)))
            .collect();
        out.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        out.into_iter().map(|(_, id)| id).collect()
    }
}
