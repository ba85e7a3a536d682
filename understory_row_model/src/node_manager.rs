// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node manager: builds the raw node tree from records and reconciles it.
//!
//! ## Reconciliation strategies
//!
//! - **By id** (a row-id function is configured): one pass over the input looks up
//!   each id in the tree's index. A hit reuses the node object anywhere in the old
//!   tree, swaps its record and moves it; a miss creates a node. Nodes not seen
//!   in the pass are swept afterwards. Linear in input plus previous tree size.
//! - **By reference** (no row-id function): records are matched by `Rc` pointer.
//!   A reused record keeps its node and, in tree mode, its whole subtree, since an
//!   unchanged `Rc` implies unchanged children. Output order follows the input.
//!
//! In flat mode this module only maintains the input-ordered leaf list; the
//! grouping stage places leaves in the tree. In tree mode the nesting of the
//! records is linked here directly.

use alloc::rc::Rc;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;
use hashbrown::{HashMap, HashSet};

use crate::change::ChangedPath;
use crate::context::StageContext;
use crate::data::RowData;
use crate::error::{RowOp, StageName, Warning, Warnings};
use crate::grouping::GroupingDelta;
use crate::options::RowModelOptions;
use crate::tree::Tree;
use crate::types::{NodeFlags, NodeId, RowId};

/// Derives a row's id from its record.
pub type RowIdFn<R> = Rc<dyn Fn(&R) -> RowId>;

/// A row addressed by id or by record.
pub enum RowRef<R> {
    /// Match by row id.
    Id(RowId),
    /// Match by the record: through the row-id function if configured, else by `Rc` identity.
    Record(Rc<R>),
}

impl<R> Clone for RowRef<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Id(id) => Self::Id(id.clone()),
            Self::Record(r) => Self::Record(r.clone()),
        }
    }
}

impl<R> fmt::Debug for RowRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Self::Record(r) => f.debug_tuple("Record").field(&Rc::as_ptr(r)).finish(),
        }
    }
}

impl<R> From<RowId> for RowRef<R> {
    fn from(id: RowId) -> Self {
        Self::Id(id)
    }
}

impl<R> From<&str> for RowRef<R> {
    fn from(id: &str) -> Self {
        Self::Id(RowId::new(id))
    }
}

impl<R> From<Rc<R>> for RowRef<R> {
    fn from(record: Rc<R>) -> Self {
        Self::Record(record)
    }
}

/// A batch of edits applied against the live tree.
///
/// Removals run first, then updates, then additions.
///
/// ```
/// use understory_row_model::{MapRow, RowTransaction};
///
/// let tx = RowTransaction::new()
///     .add(MapRow::new().with("id", "C").shared())
///     .remove("B");
/// assert_eq!(tx.add.len(), 1);
/// assert_eq!(tx.remove.len(), 1);
/// ```
pub struct RowTransaction<R> {
    /// Records to insert.
    pub add: Vec<Rc<R>>,
    /// Insert position among the parent's children (flat mode: in the input order).
    /// Appends when `None` or out of range.
    pub add_index: Option<usize>,
    /// Tree mode: id of the node to add under. `None` adds at the top level.
    pub add_parent: Option<RowId>,
    /// Rows to remove together with their subtrees.
    pub remove: Vec<RowRef<R>>,
    /// Replacement records, matched to existing rows.
    pub update: Vec<Rc<R>>,
}

impl<R> Default for RowTransaction<R> {
    fn default() -> Self {
        Self {
            add: Vec::new(),
            add_index: None,
            add_parent: None,
            remove: Vec::new(),
            update: Vec::new(),
        }
    }
}

impl<R> Clone for RowTransaction<R> {
    fn clone(&self) -> Self {
        Self {
            add: self.add.clone(),
            add_index: self.add_index,
            add_parent: self.add_parent.clone(),
            remove: self.remove.clone(),
            update: self.update.clone(),
        }
    }
}

impl<R> fmt::Debug for RowTransaction<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowTransaction")
            .field("add", &self.add.len())
            .field("add_index", &self.add_index)
            .field("add_parent", &self.add_parent)
            .field("remove", &self.remove)
            .field("update", &self.update.len())
            .finish()
    }
}

impl<R> RowTransaction<R> {
    /// Create an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style addition.
    pub fn add(mut self, record: Rc<R>) -> Self {
        self.add.push(record);
        self
    }

    /// Builder-style insert position for the additions.
    pub fn at(mut self, index: usize) -> Self {
        self.add_index = Some(index);
        self
    }

    /// Builder-style parent for the additions (tree mode).
    pub fn under(mut self, parent: impl Into<RowId>) -> Self {
        self.add_parent = Some(parent.into());
        self
    }

    /// Builder-style removal.
    pub fn remove(mut self, row: impl Into<RowRef<R>>) -> Self {
        self.remove.push(row.into());
        self
    }

    /// Builder-style update.
    pub fn update(mut self, record: Rc<R>) -> Self {
        self.update.push(record);
        self
    }

    /// True if the transaction carries no edits.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }
}

/// Nodes a transaction actually affected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionResult {
    /// Created nodes (subtree roots in tree mode).
    pub added: Vec<NodeId>,
    /// Ids of removed rows (subtree roots).
    pub removed: Vec<RowId>,
    /// Nodes whose record was replaced.
    pub updated: Vec<NodeId>,
    /// Removal, update or parent references that matched no live row.
    pub unmatched: Vec<RowId>,
}

/// Everything the orchestrator needs after applying one transaction.
#[derive(Debug, Default)]
pub(crate) struct Applied {
    pub(crate) result: TransactionResult,
    pub(crate) path: ChangedPath,
    pub(crate) delta: GroupingDelta,
    pub(crate) removed_selected: Vec<RowId>,
}

/// Placeholder id reported for record references that matched nothing.
const UNMATCHED_RECORD: &str = "<unmatched record>";

/// Builds and reconciles the raw node tree.
pub(crate) struct NodeManager<R> {
    row_id: Option<RowIdFn<R>>,
    next_id: u64,
    /// Flat mode: every leaf, in input order.
    leaves: Vec<NodeId>,
}

impl<R> fmt::Debug for NodeManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeManager")
            .field("by_id", &self.row_id.is_some())
            .field("next_id", &self.next_id)
            .field("leaves", &self.leaves.len())
            .finish()
    }
}

impl<R: RowData> NodeManager<R> {
    pub(crate) fn new(row_id: Option<RowIdFn<R>>) -> Self {
        Self {
            row_id,
            next_id: 0,
            leaves: Vec::new(),
        }
    }

    /// Flat-mode leaves in input order.
    pub(crate) fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    pub(crate) fn reset(&mut self) {
        self.leaves.clear();
    }

    /// Current top-level records, in input order.
    pub(crate) fn records(&self, tree: &Tree<R>, options: &RowModelOptions) -> Vec<Rc<R>> {
        let top: &[NodeId] = if options.tree_data {
            &tree.node(tree.root()).children
        } else {
            &self.leaves
        };
        top.iter()
            .filter_map(|&id| tree.get(id).and_then(|n| n.data.clone()))
            .collect()
    }

    fn generate_id(&mut self) -> RowId {
        let id = RowId::from(self.next_id.to_string());
        self.next_id += 1;
        id
    }

    fn id_of(&mut self, record: &R) -> RowId {
        match &self.row_id {
            Some(f) => f(record),
            None => self.generate_id(),
        }
    }

    fn create(
        &mut self,
        tree: &mut Tree<R>,
        record: &Rc<R>,
        id: RowId,
        level: u32,
        options: &RowModelOptions,
    ) -> NodeId {
        let flags = if options.tree_data && options.expands_level(level) {
            NodeFlags::EXPANDED
        } else {
            NodeFlags::empty()
        };
        let n = tree.insert(id, Some(record.clone()), flags);
        tree.node_mut(n).epoch = tree.epoch;
        n
    }

    /// Create a node outside the body tree (pinned rows).
    pub(crate) fn create_detached(&mut self, tree: &mut Tree<R>, record: Rc<R>, id: RowId, flags: NodeFlags) -> NodeId {
        tree.insert(id, Some(record), flags)
    }

    /// Replace the whole input.
    ///
    /// Returns the ids of removed rows that were selected.
    #[tracing::instrument(skip_all, fields(records = records.len(), by_id = self.row_id.is_some()))]
    pub(crate) fn set_row_data(
        &mut self,
        tree: &mut Tree<R>,
        records: &[Rc<R>],
        options: &RowModelOptions,
        warnings: &mut Warnings,
    ) -> Vec<RowId> {
        let mut ctx = StageContext::new(StageName::NodeManager, warnings);
        tree.epoch += 1;
        let root = tree.root();
        let by_ref = self.row_id.is_none().then(|| pointer_index(tree));

        let mut build = Build {
            layout: Vec::from([(root, Vec::new())]),
            kept: Vec::new(),
        };
        for record in records {
            self.build(tree, record, 0, 0, by_ref.as_ref(), &mut build, options, &mut ctx);
        }

        // Sweep every body node the pass did not reach.
        let epoch = tree.epoch;
        let stale: Vec<NodeId> = tree
            .iter()
            .filter(|(_, n)| {
                n.epoch != epoch
                    && !n.flags.intersects(
                        NodeFlags::ROOT
                            | NodeFlags::FILLER
                            | NodeFlags::PINNED_TOP
                            | NodeFlags::PINNED_BOTTOM,
                    )
            })
            .map(|(id, _)| id)
            .collect();
        let mut removed_selected = Vec::new();
        for &id in &stale {
            if let Some(node) = tree.discard(id)
                && node.flags.contains(NodeFlags::SELECTED)
            {
                removed_selected.push(node.id);
            }
        }

        let Build { layout, kept } = build;
        if options.tree_data {
            for &id in kept.iter().chain(core::iter::once(&root)) {
                let n = tree.node_mut(id);
                n.parent = None;
                n.children.clear();
                n.children_after_filter.clear();
                n.children_after_sort.clear();
            }
            for (parent, children) in layout {
                for (i, &c) in children.iter().enumerate() {
                    tree.node_mut(c).source_index = i;
                }
                tree.set_children(parent, children);
            }
            for &id in &kept {
                let n = tree.node_mut(id);
                n.flags.set(NodeFlags::GROUP, !n.children.is_empty());
                if !n.is_group() {
                    n.aggregates = None;
                }
            }
        } else {
            let (_, leaves) = layout.into_iter().next().unwrap_or((root, Vec::new()));
            for (i, &leaf) in leaves.iter().enumerate() {
                tree.node_mut(leaf).source_index = i;
            }
            self.leaves = leaves;
        }
        tracing::debug!(
            kept = kept.len(),
            swept = stale.len(),
            "row data reconciled"
        );
        removed_selected
    }

    fn build(
        &mut self,
        tree: &mut Tree<R>,
        record: &Rc<R>,
        parent_slot: usize,
        level: u32,
        by_ref: Option<&HashMap<*const R, NodeId>>,
        build: &mut Build,
        options: &RowModelOptions,
        ctx: &mut StageContext<'_>,
    ) {
        let epoch = tree.epoch;
        let matched = match by_ref {
            Some(index) => index.get(&Rc::as_ptr(record)).copied(),
            None => {
                let id = self.id_of(record);
                match tree.lookup(id.as_str()) {
                    Some(n) => Some(n),
                    None => {
                        let n = self.create(tree, record, id, level, options);
                        build.accept(n, parent_slot);
                        self.build_children(tree, record, n, level, by_ref, build, options, ctx);
                        return;
                    }
                }
            }
        };
        let Some(n) = matched else {
            let id = self.generate_id();
            let n = self.create(tree, record, id, level, options);
            build.accept(n, parent_slot);
            self.build_children(tree, record, n, level, by_ref, build, options, ctx);
            return;
        };
        let node = tree.node_mut(n);
        if node.epoch == epoch || node.flags.contains(NodeFlags::FILLER) {
            let id = node.id.clone();
            ctx.warn(Warning::DuplicateRowId(id));
            return;
        }
        node.epoch = epoch;
        node.data = Some(record.clone());
        node.sort_key = None;
        build.accept(n, parent_slot);
        if by_ref.is_some() && options.tree_data {
            build.keep_subtree(tree, n, ctx);
        } else {
            self.build_children(tree, record, n, level, by_ref, build, options, ctx);
        }
    }

    fn build_children(
        &mut self,
        tree: &mut Tree<R>,
        record: &Rc<R>,
        node: NodeId,
        level: u32,
        by_ref: Option<&HashMap<*const R, NodeId>>,
        build: &mut Build,
        options: &RowModelOptions,
        ctx: &mut StageContext<'_>,
    ) {
        if !options.tree_data {
            return;
        }
        let Some(children) = record.children().filter(|c| !c.is_empty()) else {
            return;
        };
        let slot = build.layout.len();
        build.layout.push((node, Vec::new()));
        for child in children {
            self.build(tree, child, slot, level + 1, by_ref, build, options, ctx);
        }
    }

    /// Apply one transaction to the raw tree.
    #[tracing::instrument(
        skip_all,
        fields(add = tx.add.len(), remove = tx.remove.len(), update = tx.update.len())
    )]
    pub(crate) fn apply(
        &mut self,
        tree: &mut Tree<R>,
        tx: RowTransaction<R>,
        options: &RowModelOptions,
        warnings: &mut Warnings,
    ) -> Applied {
        let mut ctx = StageContext::new(StageName::NodeManager, warnings);
        let mut applied = Applied::default();
        let mut by_ref: Option<HashMap<*const R, NodeId>> = None;
        let root = tree.root();
        let mut touched_parents: HashSet<NodeId> = HashSet::new();
        let mut structure_changed = false;

        for row in &tx.remove {
            let Some(n) = self.locate(tree, row, &mut by_ref) else {
                let id = self.describe(row);
                ctx.warn(Warning::UnknownRowId {
                    op: RowOp::Remove,
                    id: id.clone(),
                });
                applied.result.unmatched.push(id);
                continue;
            };
            let parent = tree.node(n).parent;
            if let Some(p) = parent {
                applied.path.add_with_ancestors(tree, p);
            }
            let freed = tree.remove_subtree(n);
            structure_changed = true;
            for node in &freed {
                if node.flags.contains(NodeFlags::SELECTED) {
                    applied.removed_selected.push(node.id.clone());
                }
            }
            if let Some(first) = freed.into_iter().next() {
                applied.result.removed.push(first.id);
            }
            match parent {
                Some(p) if options.tree_data => {
                    touched_parents.insert(p);
                    if p != root && tree.node(p).children.is_empty() {
                        let pn = tree.node_mut(p);
                        pn.flags.remove(NodeFlags::GROUP);
                        pn.aggregates = None;
                        pn.sort_key = None;
                        pn.children_after_filter.clear();
                        pn.children_after_sort.clear();
                    }
                }
                Some(p) => applied.delta.vacated.push(p),
                None => {}
            }
        }
        if structure_changed && !options.tree_data {
            self.leaves.retain(|&id| tree.is_alive(id));
        }

        for record in &tx.update {
            let row = RowRef::Record(record.clone());
            let Some(n) = self.locate(tree, &row, &mut by_ref) else {
                let id = self.describe(&row);
                ctx.warn(Warning::UnknownRowId {
                    op: RowOp::Update,
                    id: id.clone(),
                });
                applied.result.unmatched.push(id);
                continue;
            };
            let node = tree.node_mut(n);
            node.data = Some(record.clone());
            node.sort_key = None;
            applied.path.add_with_ancestors(tree, n);
            if !options.tree_data {
                applied.delta.placed.push(n);
            }
            applied.result.updated.push(n);
        }

        if !tx.add.is_empty() {
            structure_changed = true;
            if options.tree_data {
                self.add_tree(tree, &tx, options, &mut ctx, &mut applied, &mut touched_parents);
            } else {
                self.add_flat(tree, &tx, options, &mut ctx, &mut applied);
            }
        }

        if structure_changed {
            if options.tree_data {
                for p in touched_parents {
                    if let Some(node) = tree.get(p) {
                        let children = node.children.clone();
                        for (i, c) in children.into_iter().enumerate() {
                            tree.node_mut(c).source_index = i;
                        }
                    }
                }
            } else {
                for (i, &leaf) in self.leaves.iter().enumerate() {
                    tree.node_mut(leaf).source_index = i;
                }
            }
        }
        tracing::debug!(
            added = applied.result.added.len(),
            removed = applied.result.removed.len(),
            updated = applied.result.updated.len(),
            unmatched = applied.result.unmatched.len(),
            "transaction applied"
        );
        applied
    }

    fn add_flat(
        &mut self,
        tree: &mut Tree<R>,
        tx: &RowTransaction<R>,
        options: &RowModelOptions,
        ctx: &mut StageContext<'_>,
        applied: &mut Applied,
    ) {
        let mut at = tx
            .add_index
            .map_or(self.leaves.len(), |i| i.min(self.leaves.len()));
        for record in &tx.add {
            let id = self.id_of(record);
            if tree.lookup(id.as_str()).is_some() {
                ctx.warn(Warning::DuplicateRowId(id));
                continue;
            }
            let n = self.create(tree, record, id, 0, options);
            self.leaves.insert(at, n);
            at += 1;
            applied.delta.placed.push(n);
            applied.result.added.push(n);
        }
    }

    fn add_tree(
        &mut self,
        tree: &mut Tree<R>,
        tx: &RowTransaction<R>,
        options: &RowModelOptions,
        ctx: &mut StageContext<'_>,
        applied: &mut Applied,
        touched_parents: &mut HashSet<NodeId>,
    ) {
        let root = tree.root();
        let parent = match &tx.add_parent {
            None => root,
            Some(pid) => match tree
                .lookup(pid.as_str())
                .filter(|&p| !tree.node(p).flags.contains(NodeFlags::FILLER))
            {
                Some(p) => p,
                None => {
                    ctx.warn(Warning::UnknownRowId {
                        op: RowOp::AddParent,
                        id: pid.clone(),
                    });
                    applied.result.unmatched.push(pid.clone());
                    return;
                }
            },
        };
        let level = if parent == root {
            0
        } else {
            tree.node(parent).level() + 1
        };
        let mut at = tx.add_index;
        for record in &tx.add {
            let Some(n) = self.create_subtree(tree, record, level, options, ctx) else {
                continue;
            };
            tree.link(n, parent, at);
            at = at.map(|i| i + 1);
            if parent != root {
                tree.node_mut(parent).flags.insert(NodeFlags::GROUP);
            }
            applied.path.add_with_ancestors(tree, n);
            for d in tree.descendants(n) {
                applied.path.add_with_ancestors(tree, d);
            }
            applied.result.added.push(n);
        }
        touched_parents.insert(parent);
    }

    /// Create a detached node for `record` and its nested records.
    fn create_subtree(
        &mut self,
        tree: &mut Tree<R>,
        record: &Rc<R>,
        level: u32,
        options: &RowModelOptions,
        ctx: &mut StageContext<'_>,
    ) -> Option<NodeId> {
        let id = self.id_of(record);
        if tree.lookup(id.as_str()).is_some() {
            ctx.warn(Warning::DuplicateRowId(id));
            return None;
        }
        let n = self.create(tree, record, id, level, options);
        if let Some(children) = record.children() {
            for child in children {
                if let Some(c) = self.create_subtree(tree, child, level + 1, options, ctx) {
                    let i = tree.node(n).children.len();
                    tree.link(c, n, None);
                    tree.node_mut(c).source_index = i;
                }
            }
        }
        let node = tree.node_mut(n);
        node.flags.set(NodeFlags::GROUP, !node.children.is_empty());
        Some(n)
    }

    fn locate(
        &self,
        tree: &Tree<R>,
        row: &RowRef<R>,
        by_ref: &mut Option<HashMap<*const R, NodeId>>,
    ) -> Option<NodeId> {
        let found = match (row, &self.row_id) {
            (RowRef::Id(id), _) => tree.lookup(id.as_str()),
            (RowRef::Record(r), Some(f)) => tree.lookup(f(&**r).as_str()),
            (RowRef::Record(r), None) => by_ref
                .get_or_insert_with(|| pointer_index(tree))
                .get(&Rc::as_ptr(r))
                .copied(),
        };
        found.filter(|&n| {
            tree.get(n).is_some_and(|node| {
                !node
                    .flags
                    .intersects(NodeFlags::ROOT | NodeFlags::FILLER)
            })
        })
    }

    fn describe(&self, row: &RowRef<R>) -> RowId {
        match (row, &self.row_id) {
            (RowRef::Id(id), _) => id.clone(),
            (RowRef::Record(r), Some(f)) => f(&**r),
            (RowRef::Record(_), None) => RowId::new(UNMATCHED_RECORD),
        }
    }
}

/// Layout collected by a full-replace pass.
struct Build {
    /// `(parent, children)` in pre-order; slot 0 is the root.
    layout: Vec<(NodeId, Vec<NodeId>)>,
    kept: Vec<NodeId>,
}

impl Build {
    fn accept(&mut self, node: NodeId, parent_slot: usize) {
        self.layout[parent_slot].1.push(node);
        self.kept.push(node);
    }

    /// Keep the current subtree below a reused node as is.
    fn keep_subtree<R>(&mut self, tree: &mut Tree<R>, node: NodeId, ctx: &mut StageContext<'_>) {
        let epoch = tree.epoch;
        let mut stack = Vec::from([node]);
        while let Some(cur) = stack.pop() {
            let mut children = Vec::new();
            for c in tree.node(cur).children.clone() {
                let child = tree.node_mut(c);
                if child.epoch == epoch {
                    ctx.warn(Warning::DuplicateRowId(child.id.clone()));
                    continue;
                }
                child.epoch = epoch;
                children.push(c);
            }
            if children.is_empty() {
                continue;
            }
            self.kept.extend(children.iter().copied());
            stack.extend(children.iter().rev().copied());
            self.layout.push((cur, children));
        }
    }
}

/// Map from record address to node for the live body rows.
fn pointer_index<R>(tree: &Tree<R>) -> HashMap<*const R, NodeId> {
    tree.iter()
        .filter(|(_, n)| {
            !n.flags.intersects(
                NodeFlags::ROOT | NodeFlags::FILLER | NodeFlags::PINNED_TOP | NodeFlags::PINNED_BOTTOM,
            )
        })
        .filter_map(|(id, n)| n.data.as_ref().map(|d| (Rc::as_ptr(d), id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MapRow;
    use alloc::string::String;
    use alloc::vec;

    fn by_id() -> NodeManager<MapRow> {
        NodeManager::new(Some(Rc::new(|r: &MapRow| {
            RowId::from(r.value("id").map(|v| v.key_string()).unwrap_or_default())
        })))
    }

    fn row(id: &str, v: i64) -> Rc<MapRow> {
        MapRow::new().with("id", id).with("v", v).shared()
    }

    fn leaf_ids(nm: &NodeManager<MapRow>, tree: &Tree<MapRow>) -> Vec<String> {
        nm.leaves()
            .iter()
            .map(|&n| String::from(tree.node(n).id.as_str()))
            .collect()
    }

    #[test]
    fn id_mode_reuses_nodes_across_permutations() {
        let mut tree = Tree::new();
        let mut nm = by_id();
        let mut warnings = Warnings::default();
        let opts = RowModelOptions::default();
        nm.set_row_data(&mut tree, &[row("a", 1), row("b", 2)], &opts, &mut warnings);
        let a = tree.lookup("a").unwrap();
        tree.node_mut(a).flags |= NodeFlags::SELECTED;

        nm.set_row_data(&mut tree, &[row("b", 3), row("a", 4)], &opts, &mut warnings);
        assert_eq!(tree.lookup("a"), Some(a));
        assert!(tree.node(a).flags.contains(NodeFlags::SELECTED));
        assert_eq!(leaf_ids(&nm, &tree), vec!["b", "a"]);
        assert_eq!(tree.node(a).source_index, 1);

        let removed = nm.set_row_data(&mut tree, &[row("b", 3)], &opts, &mut warnings);
        assert_eq!(removed, vec![RowId::new("a")]);
        assert!(!tree.is_alive(a));
        assert!(warnings.is_empty());
    }

    #[test]
    fn duplicate_ids_keep_first_occurrence() {
        let mut tree = Tree::new();
        let mut nm = by_id();
        let mut warnings = Warnings::default();
        let first = row("a", 1);
        nm.set_row_data(
            &mut tree,
            &[first.clone(), row("a", 2)],
            &RowModelOptions::default(),
            &mut warnings,
        );
        let a = tree.lookup("a").unwrap();
        assert!(Rc::ptr_eq(tree.node(a).data.as_ref().unwrap(), &first));
        assert_eq!(nm.leaves().len(), 1);
        assert_eq!(
            warnings.as_slice(),
            &[Warning::DuplicateRowId(RowId::new("a"))]
        );
    }

    #[test]
    fn reference_mode_matches_by_pointer() {
        let mut tree = Tree::new();
        let mut nm: NodeManager<MapRow> = NodeManager::new(None);
        let mut warnings = Warnings::default();
        let opts = RowModelOptions::default();
        let (a, b) = (row("a", 1), row("b", 2));
        nm.set_row_data(&mut tree, &[a.clone(), b.clone()], &opts, &mut warnings);
        let na = nm.leaves()[0];

        // Equal contents but a new allocation does not match.
        nm.set_row_data(&mut tree, &[b.clone(), a.clone(), row("a", 1)], &opts, &mut warnings);
        assert_eq!(nm.leaves()[1], na);
        assert_eq!(nm.leaves().len(), 3);
        assert_ne!(nm.leaves()[2], na);
    }

    #[test]
    fn reference_mode_keeps_whole_subtrees() {
        let mut tree = Tree::new();
        let mut nm: NodeManager<MapRow> = NodeManager::new(None);
        let mut warnings = Warnings::default();
        let opts = RowModelOptions::tree_data();
        let parent = MapRow::new()
            .with("id", "A")
            .with_children([row("B", 2)])
            .shared();
        nm.set_row_data(&mut tree, &[parent.clone()], &opts, &mut warnings);
        let root = tree.root();
        let a = tree.node(root).children[0];
        let b = tree.node(a).children[0];

        let other = row("C", 3);
        nm.set_row_data(&mut tree, &[other, parent], &opts, &mut warnings);
        assert_eq!(tree.node(root).children[1], a);
        assert_eq!(tree.node(a).children, vec![b]);
        assert!(tree.node(a).is_group());
        assert!(tree.check_invariants(&[], false).is_ok());
    }

    #[test]
    fn tree_mode_links_nested_records() {
        let mut tree = Tree::new();
        let mut nm = by_id();
        let mut warnings = Warnings::default();
        let opts = RowModelOptions::tree_data().with_group_default_expanded(-1);
        let input = MapRow::new()
            .with("id", "A")
            .with("v", 1)
            .with_children([row("B", 2)])
            .shared();
        nm.set_row_data(&mut tree, &[input], &opts, &mut warnings);
        let a = tree.lookup("A").unwrap();
        let b = tree.lookup("B").unwrap();
        assert!(tree.node(a).is_group() && tree.node(a).is_expanded());
        assert_eq!(tree.node(b).parent, Some(a));
        assert_eq!(tree.node(b).level(), 1);

        // Re-nesting B at the top level moves the same node.
        nm.set_row_data(&mut tree, &[row("A", 1), row("B", 2)], &opts, &mut warnings);
        assert_eq!(tree.lookup("B"), Some(b));
        assert_eq!(tree.node(b).level(), 0);
        assert!(!tree.node(a).is_group());
        assert!(tree.check_invariants(&[], false).is_ok());
    }

    #[test]
    fn transactions_apply_remove_update_add() {
        let mut tree = Tree::new();
        let mut nm = by_id();
        let mut warnings = Warnings::default();
        let opts = RowModelOptions::default();
        nm.set_row_data(&mut tree, &[row("a", 1), row("b", 2)], &opts, &mut warnings);
        let b = tree.lookup("b").unwrap();

        let tx = RowTransaction::new()
            .remove("a")
            .remove("zz")
            .update(row("b", 9))
            .add(row("c", 3))
            .at(0);
        let applied = nm.apply(&mut tree, tx, &opts, &mut warnings);
        assert_eq!(applied.result.removed, vec![RowId::new("a")]);
        assert_eq!(applied.result.updated, vec![b]);
        assert_eq!(applied.result.unmatched, vec![RowId::new("zz")]);
        assert_eq!(applied.result.added.len(), 1);
        assert_eq!(leaf_ids(&nm, &tree), vec!["c", "b"]);
        assert_eq!(tree.node(b).source_index, 1);
        assert_eq!(warnings.as_slice().len(), 1);
    }

    #[test]
    fn tree_mode_add_under_parent_and_demote_on_remove() {
        let mut tree = Tree::new();
        let mut nm = by_id();
        let mut warnings = Warnings::default();
        let opts = RowModelOptions::tree_data();
        nm.set_row_data(&mut tree, &[row("A", 1)], &opts, &mut warnings);
        let a = tree.lookup("A").unwrap();

        let applied = nm.apply(
            &mut tree,
            RowTransaction::new().add(row("B", 2)).under("A"),
            &opts,
            &mut warnings,
        );
        let b = applied.result.added[0];
        assert!(tree.node(a).is_group());
        assert!(applied.path.contains(a) && applied.path.contains(b));

        nm.apply(&mut tree, RowTransaction::new().remove("B"), &opts, &mut warnings);
        assert!(!tree.node(a).is_group());
        assert!(tree.node(a).children.is_empty());

        let applied = nm.apply(
            &mut tree,
            RowTransaction::new().add(row("C", 3)).under("nope"),
            &opts,
            &mut warnings,
        );
        assert_eq!(applied.result.unmatched, vec![RowId::new("nope")]);
        assert!(tree.lookup("C").is_none());
    }
}
