// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flatten stage: the display sequence.
//!
//! A pre-order walk over `children_after_sort`: every node is emitted, and an
//! expanded group's children follow it. Display indices are dense from 0. Nodes
//! that drop out of the sequence have their index cleared.

use alloc::vec::Vec;

use crate::tree::Tree;
use crate::types::NodeId;

/// Rebuild the display sequence, clearing indices of `previous` rows first.
#[tracing::instrument(skip_all, fields(previous = previous.len()))]
pub(crate) fn run<R>(tree: &mut Tree<R>, previous: &[NodeId]) -> Vec<NodeId> {
    for &id in previous {
        if let Some(n) = tree.get_mut(id) {
            n.display_index = None;
        }
    }
    let mut rows = Vec::new();
    let root = tree.root();
    let mut stack: Vec<NodeId> = tree
        .node(root)
        .children_after_sort
        .iter()
        .rev()
        .copied()
        .collect();
    while let Some(id) = stack.pop() {
        let node = tree.node_mut(id);
        node.display_index = Some(rows.len());
        rows.push(id);
        if node.is_group() && node.is_expanded() {
            stack.extend(node.children_after_sort.iter().rev().copied());
        }
    }
    tracing::debug!(rows = rows.len(), "flattened");
    rows
}

/// Index a detached row sequence (pinned rows) with the same dense rule.
pub(crate) fn index_pinned<R>(tree: &mut Tree<R>, rows: &[NodeId]) {
    for (i, &id) in rows.iter().enumerate() {
        if let Some(n) = tree.get_mut(id) {
            n.display_index = Some(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeFlags, RowId};
    use alloc::rc::Rc;
    use alloc::vec;

    #[test]
    fn collapsed_groups_hide_descendants() {
        let mut tree: Tree<()> = Tree::new();
        let root = tree.root();
        let g = tree.insert(RowId::new("g"), None, NodeFlags::GROUP | NodeFlags::EXPANDED);
        let a = tree.insert(RowId::new("a"), Some(Rc::new(())), NodeFlags::empty());
        let b = tree.insert(RowId::new("b"), Some(Rc::new(())), NodeFlags::empty());
        tree.link(g, root, None);
        tree.link(a, g, None);
        tree.link(b, root, None);
        tree.node_mut(root).children_after_sort = vec![g, b];
        tree.node_mut(g).children_after_sort = vec![a];

        let rows = run(&mut tree, &[]);
        assert_eq!(rows, vec![g, a, b]);
        assert_eq!(tree.node(b).display_index, Some(2));

        tree.node_mut(g).flags.remove(NodeFlags::EXPANDED);
        let rows = run(&mut tree, &rows);
        assert_eq!(rows, vec![g, b]);
        assert_eq!(tree.node(a).display_index, None);
        assert_eq!(tree.node(b).display_index, Some(1));
        assert!(tree.check_invariants(&rows, false).is_ok());
    }
}
