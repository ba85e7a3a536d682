// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grouping stage: synthetic filler groups over flat input.
//!
//! Leaves that share the values of the first `n` grouping fields share a filler
//! group at level `n - 1`. A filler's id is derived from its path of
//! `(field, key)` pairs:
//!
//! ```text
//! row-group-<field>-<key>[-<field>-<key>...]
//! ```
//!
//! so rebuilding the layer after a full replace or a field change finds the
//! previous filler again and keeps its expansion and selection. The
//! `row-group-` id prefix is therefore reserved. A `-` or `\` inside a field
//! name or key is escaped with a backslash, so every path maps to its own id.
//!
//! In flat mode this stage also owns the placement of leaves: with no grouping
//! fields every leaf is a direct child of the root, in input order.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::change::ChangedPath;
use crate::context::StageContext;
use crate::data::RowData;
use crate::error::{StageName, Warnings};
use crate::options::RowModelOptions;
use crate::tree::{GroupInfo, Tree};
use crate::types::{NodeFlags, NodeId, RowId};
use crate::value::Value;

/// Leaves a transaction touched, for incremental placement.
#[derive(Clone, Debug, Default)]
pub(crate) struct GroupingDelta {
    /// Added or updated leaves whose group may have changed.
    pub(crate) placed: Vec<NodeId>,
    /// Former parents of removed leaves, candidates for pruning.
    pub(crate) vacated: Vec<NodeId>,
}

impl GroupingDelta {
    pub(crate) fn merge(&mut self, other: Self) {
        self.placed.extend(other.placed);
        self.vacated.extend(other.vacated);
    }
}

/// Escape the id separator inside one path segment.
fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == '-' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Deterministic id of the filler below `parent` for `(field, key)`.
fn group_id(parent: Option<&RowId>, field: &str, key: &Value) -> RowId {
    let field = escape_segment(field);
    let key = escape_segment(&key.key_string());
    match parent {
        Some(p) => RowId::from(format!("{p}-{field}-{key}")),
        None => RowId::from(format!("row-group-{field}-{key}")),
    }
}

/// Find or create the filler for `(field, key)` under `parent`.
///
/// Returns the group and whether it was created.
fn ensure_group<R>(
    tree: &mut Tree<R>,
    parent: NodeId,
    field: &Rc<str>,
    key: Value,
    level: u32,
    options: &RowModelOptions,
) -> (NodeId, bool) {
    let parent_id = (parent != tree.root()).then(|| tree.node(parent).id.clone());
    let id = group_id(parent_id.as_ref(), field, &key);
    if let Some(existing) = tree.lookup(id.as_str())
        && is_filler_for(tree, existing, field, &key)
    {
        return (existing, false);
    }
    let mut flags = NodeFlags::GROUP | NodeFlags::FILLER;
    if options.expands_level(level) {
        flags |= NodeFlags::EXPANDED;
    }
    let g = tree.insert(id, None, flags);
    tree.node_mut(g).group = Some(GroupInfo {
        field: field.clone(),
        key,
    });
    (g, true)
}

fn is_filler_for<R>(tree: &Tree<R>, id: NodeId, field: &str, key: &Value) -> bool {
    let node = tree.node(id);
    node.flags.contains(NodeFlags::FILLER)
        && node
            .group
            .as_ref()
            .is_some_and(|g| &*g.field == field && g.key.key_string() == key.key_string())
}

/// Rebuild the whole group layer over `leaves` (input order).
///
/// Fillers whose path still occurs are reused; the rest are freed. Returns the
/// number of leaves placed.
#[tracing::instrument(skip_all, fields(fields = fields.len(), leaves = leaves.len()))]
pub(crate) fn run_full<R: RowData>(
    tree: &mut Tree<R>,
    fields: &[Rc<str>],
    leaves: &[NodeId],
    options: &RowModelOptions,
    warnings: &mut Warnings,
) -> usize {
    let mut ctx = StageContext::new(StageName::Grouping, warnings);
    let root = tree.root();

    // Detach the current layer so linking below starts from empty child lists.
    let fillers: Vec<NodeId> = tree
        .iter()
        .filter(|(_, n)| n.flags.contains(NodeFlags::FILLER))
        .map(|(id, _)| id)
        .collect();
    for &id in fillers.iter().chain(core::iter::once(&root)) {
        let n = tree.node_mut(id);
        n.children.clear();
        n.children_after_filter.clear();
        n.children_after_sort.clear();
    }
    for &leaf in leaves {
        tree.node_mut(leaf).parent = None;
    }

    // Parents in creation order, so every parent precedes its child groups.
    let mut layout: Vec<(NodeId, Vec<NodeId>)> = Vec::from([(root, Vec::new())]);
    let mut slots: HashMap<NodeId, usize> = HashMap::from([(root, 0)]);
    for &leaf in leaves {
        ctx.visited += 1;
        let mut parent = root;
        for (level, field) in fields.iter().enumerate() {
            let key = match &tree.node(leaf).data {
                Some(data) => ctx.field_value(&**data, field),
                None => Value::Null,
            };
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Grouping depth is bounded by the field list."
            )]
            let (g, _) = ensure_group(tree, parent, field, key, level as u32, options);
            if !slots.contains_key(&g) {
                slots.insert(g, layout.len());
                layout.push((g, Vec::new()));
                layout[slots[&parent]].1.push(g);
            }
            parent = g;
        }
        layout[slots[&parent]].1.push(leaf);
    }
    let groups = layout.len() - 1;
    for (parent, children) in layout {
        tree.set_children(parent, children);
    }
    let mut freed = 0;
    for id in fillers {
        if !slots.contains_key(&id) {
            tree.discard(id);
            freed += 1;
        }
    }
    tracing::debug!(groups, freed, "group layer rebuilt");
    ctx.visited
}

/// Place the leaves a transaction touched and prune emptied fillers.
///
/// Every placed leaf is added to `path` together with its (possibly new) ancestor chain.
#[tracing::instrument(skip_all, fields(placed = delta.placed.len(), vacated = delta.vacated.len()))]
pub(crate) fn run_incremental<R: RowData>(
    tree: &mut Tree<R>,
    fields: &[Rc<str>],
    delta: &GroupingDelta,
    path: &mut ChangedPath,
    options: &RowModelOptions,
    warnings: &mut Warnings,
) -> usize {
    let mut ctx = StageContext::new(StageName::Grouping, warnings);
    let root = tree.root();
    let mut vacated = delta.vacated.clone();
    for &leaf in &delta.placed {
        if !tree.is_alive(leaf) {
            continue;
        }
        ctx.visited += 1;
        let mut target = root;
        for (level, field) in fields.iter().enumerate() {
            let key = match &tree.node(leaf).data {
                Some(data) => ctx.field_value(&**data, field),
                None => Value::Null,
            };
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Grouping depth is bounded by the field list."
            )]
            let (g, created) = ensure_group(tree, target, field, key, level as u32, options);
            if created {
                tree.link(g, target, None);
            }
            target = g;
        }
        let current = tree.node(leaf).parent;
        if current != Some(target) {
            if let Some(old) = current {
                vacated.push(old);
            }
            let src = tree.node(leaf).source_index;
            let pos = tree
                .node(target)
                .children
                .partition_point(|&c| tree.node(c).source_index < src);
            tree.link(leaf, target, Some(pos));
        }
        path.add_with_ancestors(tree, leaf);
    }
    for id in vacated {
        prune(tree, id);
    }
    ctx.visited
}

/// Free `id` and then its ancestors while they are empty fillers.
fn prune<R>(tree: &mut Tree<R>, mut id: NodeId) {
    while let Some(node) = tree.get(id) {
        if !node.flags.contains(NodeFlags::FILLER) || !node.children.is_empty() {
            return;
        }
        let parent = node.parent;
        tracing::trace!(group = %node.id, "pruning empty group");
        tree.remove_subtree(id);
        match parent {
            Some(p) => id = p,
            None => return,
        }
    }
}
