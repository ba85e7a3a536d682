// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Read-only view of one row node.

use alloc::rc::Rc;
use core::fmt;

use crate::tree::{Node, Tree};
use crate::types::{DisplayState, FilterState, NodeFlags, NodeId, RowId};
use crate::value::Value;

/// A borrowed view of a live node.
///
/// Views are cheap to copy and cannot outlive the [`RowModel`](crate::RowModel)
/// borrow they came from. Use [`RowNode::node_id`] to hold on to a node across
/// mutations.
pub struct RowNode<'a, R> {
    tree: &'a Tree<R>,
    id: NodeId,
}

impl<R> Clone for RowNode<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for RowNode<'_, R> {}

impl<R> PartialEq for RowNode<'_, R> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && core::ptr::eq(self.tree, other.tree)
    }
}

impl<R> fmt::Debug for RowNode<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowNode")
            .field("id", self.id())
            .field("level", &self.level())
            .field("group", &self.is_group())
            .field("display_index", &self.display_index())
            .finish_non_exhaustive()
    }
}

impl<'a, R> RowNode<'a, R> {
    /// Wrap a live node; `None` for stale handles and the synthetic root.
    pub(crate) fn new(tree: &'a Tree<R>, id: NodeId) -> Option<Self> {
        let node = tree.get(id)?;
        (!node.flags.contains(NodeFlags::ROOT)).then_some(Self { tree, id })
    }

    fn node(&self) -> &'a Node<R> {
        self.tree.node(self.id)
    }

    fn view(&self, id: NodeId) -> Self {
        Self {
            tree: self.tree,
            id,
        }
    }

    fn views(tree: &'a Tree<R>, ids: &'a [NodeId]) -> impl ExactSizeIterator<Item = Self> + use<'a, R> {
        ids.iter().map(move |&id| Self { tree, id })
    }

    /// Arena handle; equality is node identity.
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// Row id.
    pub fn id(&self) -> &'a RowId {
        &self.node().id
    }

    /// The caller's record; `None` for filler groups.
    pub fn data(&self) -> Option<&'a Rc<R>> {
        self.node().data.as_ref()
    }

    /// Parent node; `None` at the top level.
    pub fn parent(&self) -> Option<Self> {
        self.node().parent.and_then(|p| Self::new(self.tree, p))
    }

    /// Structural children, in input order.
    pub fn children(&self) -> impl ExactSizeIterator<Item = Self> + use<'a, R> {
        Self::views(self.tree, &self.node().children)
    }

    /// Children that passed the filter, in input order.
    pub fn children_after_filter(&self) -> impl ExactSizeIterator<Item = Self> + use<'a, R> {
        Self::views(self.tree, &self.node().children_after_filter)
    }

    /// Filtered children in display order.
    pub fn children_after_sort(&self) -> impl ExactSizeIterator<Item = Self> + use<'a, R> {
        Self::views(self.tree, &self.node().children_after_sort)
    }

    /// Depth below the top level (top level is 0).
    pub fn level(&self) -> u32 {
        self.node().level()
    }

    /// True for filler groups and tree-data nodes with children.
    pub fn is_group(&self) -> bool {
        self.node().is_group()
    }

    /// True for groups synthesized by grouping.
    pub fn is_filler(&self) -> bool {
        self.node().flags.contains(NodeFlags::FILLER)
    }

    /// True for nodes without children.
    pub fn is_leaf(&self) -> bool {
        !self.is_group()
    }

    /// True for pinned top or bottom rows.
    pub fn is_pinned(&self) -> bool {
        self.node()
            .flags
            .intersects(NodeFlags::PINNED_TOP | NodeFlags::PINNED_BOTTOM)
    }

    /// Whether this group shows its children.
    pub fn expanded(&self) -> bool {
        self.is_group() && self.node().is_expanded()
    }

    /// Whether the row is selected.
    pub fn selected(&self) -> bool {
        self.node().flags.contains(NodeFlags::SELECTED)
    }

    /// Position in the display sequence, if displayed.
    pub fn display_index(&self) -> Option<usize> {
        self.node().display_index
    }

    /// Why the node is or is not displayed.
    pub fn display_state(&self) -> DisplayState {
        let node = self.node();
        if let Some(i) = node.display_index {
            return DisplayState::Displayed(i);
        }
        let filtered_out = core::iter::once(self.id)
            .chain(self.tree.ancestors(self.id))
            .any(|a| self.tree.node(a).filter_state == FilterState::Fail);
        if filtered_out {
            DisplayState::FilteredOut
        } else {
            DisplayState::Collapsed
        }
    }

    /// Result of the last filter run.
    pub fn filter_state(&self) -> FilterState {
        self.node().filter_state
    }

    /// Aggregate of `field`; groups only.
    pub fn aggregate(&self, field: &str) -> Option<&'a Value> {
        self.node()
            .aggregates
            .as_ref()?
            .iter()
            .find(|c| &*c.field == field)
            .map(|c| &c.value)
    }

    /// Every aggregate, in aggregation model order.
    pub fn aggregates(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + use<'a, R> {
        self.node()
            .aggregates
            .iter()
            .flatten()
            .map(|c| (&*c.field, &c.value))
    }

    /// Grouping field of a filler group.
    pub fn group_field(&self) -> Option<&'a str> {
        self.node().group.as_ref().map(|g| &*g.field)
    }

    /// Grouping key of a filler group.
    pub fn group_key(&self) -> Option<&'a Value> {
        self.node().group.as_ref().map(|g| &g.key)
    }

    /// Position among the input records (flat mode) or among siblings (tree mode).
    pub fn source_index(&self) -> usize {
        self.node().source_index
    }

    /// Number of leaf rows below this group, ignoring filters.
    pub fn all_leaf_count(&self) -> usize {
        self.node().leaf_count
    }

    /// First structural child, if any.
    pub fn first_child(&self) -> Option<Self> {
        self.node().children.first().map(|&c| self.view(c))
    }
}
