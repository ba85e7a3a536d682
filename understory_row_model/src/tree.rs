// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node arena: slots, generations, parent/child links, and the id index.

use alloc::rc::Rc;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};

use crate::aggregation::AggCell;
use crate::error::InvariantViolation;
use crate::types::{FilterState, NodeFlags, NodeId, RowId};
use crate::value::Value;

/// Id carried by the synthetic root.
pub(crate) const ROOT_ID: &str = "ROOT_NODE_ID";

/// Grouping coordinates of a filler group.
#[derive(Clone, Debug)]
pub(crate) struct GroupInfo {
    pub(crate) field: Rc<str>,
    pub(crate) key: Value,
}

#[derive(Clone, Debug)]
pub(crate) struct Node<R> {
    generation: u32,
    pub(crate) id: RowId,
    pub(crate) data: Option<Rc<R>>,
    pub(crate) parent: Option<NodeId>,
    /// Structural children in input order.
    pub(crate) children: Vec<NodeId>,
    pub(crate) children_after_filter: Vec<NodeId>,
    pub(crate) children_after_sort: Vec<NodeId>,
    /// Root is depth 0; public `level` is `depth - 1`.
    pub(crate) depth: u32,
    pub(crate) flags: NodeFlags,
    pub(crate) group: Option<GroupInfo>,
    pub(crate) filter_state: FilterState,
    pub(crate) aggregates: Option<Vec<AggCell>>,
    /// Cached sort values, tagged with the sort model epoch they were computed for.
    pub(crate) sort_key: Option<(u64, Vec<Value>)>,
    pub(crate) display_index: Option<usize>,
    pub(crate) source_index: usize,
    pub(crate) leaf_count: usize,
    /// Last reconciliation pass that saw this node.
    pub(crate) epoch: u64,
}

impl<R> Node<R> {
    fn new(generation: u32, id: RowId, data: Option<Rc<R>>, flags: NodeFlags) -> Self {
        Self {
            generation,
            id,
            data,
            parent: None,
            children: Vec::new(),
            children_after_filter: Vec::new(),
            children_after_sort: Vec::new(),
            depth: 0,
            flags,
            group: None,
            filter_state: FilterState::Pass,
            aggregates: None,
            sort_key: None,
            display_index: None,
            source_index: 0,
            leaf_count: 0,
            epoch: 0,
        }
    }

    pub(crate) fn is_group(&self) -> bool {
        self.flags.contains(NodeFlags::GROUP)
    }

    pub(crate) fn is_expanded(&self) -> bool {
        self.flags.contains(NodeFlags::EXPANDED)
    }

    /// Public level; the root reports 0 as well but is never exposed.
    pub(crate) fn level(&self) -> u32 {
        self.depth.saturating_sub(1)
    }
}

/// Slot arena owning every node of one row model.
pub(crate) struct Tree<R> {
    nodes: Vec<Option<Node<R>>>, // slots
    generations: Vec<u32>,       // last generation per slot (persists across frees)
    free_list: Vec<usize>,
    pub(crate) epoch: u64,
    root: NodeId,
    ids: HashMap<RowId, NodeId>,
}

impl<R> core::fmt::Debug for Tree<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        let free = self.free_list.len();
        f.debug_struct("Tree")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &free)
            .field("epoch", &self.epoch)
            .field("indexed_ids", &self.ids.len())
            .finish_non_exhaustive()
    }
}

impl<R> Tree<R> {
    /// Create a tree holding only the synthetic root.
    pub(crate) fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            epoch: 0,
            root: NodeId::new(0, 0),
            ids: HashMap::new(),
        };
        tree.root = tree.alloc(Node::new(
            0,
            RowId::new(ROOT_ID),
            None,
            NodeFlags::ROOT | NodeFlags::GROUP | NodeFlags::EXPANDED,
        ));
        tree
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    /// Insert a detached node and index its id.
    ///
    /// Pinned rows are not indexed: they live outside the body tree.
    pub(crate) fn insert(&mut self, id: RowId, data: Option<Rc<R>>, flags: NodeFlags) -> NodeId {
        let indexed = !flags.intersects(NodeFlags::PINNED_TOP | NodeFlags::PINNED_BOTTOM);
        let node_id = self.alloc(Node::new(0, id.clone(), data, flags));
        if indexed {
            let previous = self.ids.insert(id, node_id);
            debug_assert!(previous.is_none(), "row ids must be unique among live nodes");
        }
        node_id
    }

    fn alloc(&mut self, mut node: Node<R>) -> NodeId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            node.generation = generation;
            self.nodes[idx] = Some(node);
            (idx, generation)
        } else {
            let generation = 1_u32;
            node.generation = generation;
            self.nodes.push(Some(node));
            self.generations.push(generation);
            (self.nodes.len() - 1, generation)
        };
        #[allow(
            clippy::cast_possible_truncation,
            reason = "NodeId uses 32-bit indices by design."
        )]
        NodeId::new(idx as u32, generation)
    }

    /// Free a single node without touching its links.
    fn free(&mut self, id: NodeId) -> Option<Node<R>> {
        if !self.is_alive(id) {
            return None;
        }
        let node = self.nodes[id.idx()].take()?;
        if self.ids.get(&node.id) == Some(&id) {
            self.ids.remove(&node.id);
        }
        self.free_list.push(id.idx());
        Some(node)
    }

    /// Remove a node and its subtree. Returns the freed nodes, subtree root first.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> Vec<Node<R>> {
        if !self.is_alive(id) || id == self.root {
            return Vec::new();
        }
        self.unlink(id);
        let mut freed = Vec::new();
        let mut stack = Vec::from([id]);
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.free(cur) {
                stack.extend(node.children.iter().rev().copied());
                freed.push(node);
            }
        }
        freed
    }

    /// Free a node whose links the caller already dropped (sweep after reconciliation).
    pub(crate) fn discard(&mut self, id: NodeId) -> Option<Node<R>> {
        if id == self.root {
            return None;
        }
        self.free(id)
    }

    /// Append or insert `child` under `parent`.
    pub(crate) fn link(&mut self, child: NodeId, parent: NodeId, position: Option<usize>) {
        if self.node(child).parent.is_some() {
            self.unlink(child);
        }
        let parent_depth = {
            let p = self.node_mut(parent);
            match position {
                Some(i) if i < p.children.len() => p.children.insert(i, child),
                _ => p.children.push(child),
            }
            p.depth
        };
        self.node_mut(child).parent = Some(parent);
        self.set_depth(child, parent_depth + 1);
    }

    /// Detach `child` from its parent's child lists.
    pub(crate) fn unlink(&mut self, child: NodeId) {
        let Some(parent) = self.node_mut(child).parent.take() else {
            return;
        };
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|c| *c != child);
            p.children_after_filter.retain(|c| *c != child);
            p.children_after_sort.retain(|c| *c != child);
        }
    }

    /// Replace the structural children of `parent` wholesale.
    ///
    /// Callers guarantee each child is listed once and is not listed under another parent.
    pub(crate) fn set_children(&mut self, parent: NodeId, children: Vec<NodeId>) {
        let depth = self.node(parent).depth + 1;
        for &c in &children {
            self.node_mut(c).parent = Some(parent);
            self.set_depth(c, depth);
        }
        self.node_mut(parent).children = children;
    }

    fn set_depth(&mut self, id: NodeId, depth: u32) {
        if self.node(id).depth == depth {
            return;
        }
        let mut stack = Vec::from([(id, depth)]);
        while let Some((cur, d)) = stack.pop() {
            let node = self.node_mut(cur);
            node.depth = d;
            for &c in &node.children {
                stack.push((c, d + 1));
            }
        }
    }

    /// Returns true if `id` refers to a live node.
    ///
    /// A `NodeId` is considered live if its slot exists and its generation matches
    /// the current generation stored in that slot.
    pub(crate) fn is_alive(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .is_some_and(|n| n.generation == id.1)
    }

    /// Access a node; panics if `id` is stale.
    pub(crate) fn node(&self, id: NodeId) -> &Node<R> {
        self.get(id).expect("dangling NodeId")
    }

    /// Access a node mutably; panics if `id` is stale.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node<R> {
        self.get_mut(id).expect("dangling NodeId")
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node<R>> {
        let n = self.nodes.get(id.idx())?.as_ref()?;
        (n.generation == id.1).then_some(n)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<R>> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    /// Find a live indexed node by row id.
    pub(crate) fn lookup(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Iterate every live slot (including the root and pinned rows).
    pub(crate) fn iter(&self) -> impl Iterator<Item = (NodeId, &Node<R>)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            n.as_ref().map(|n| {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "NodeId uses 32-bit indices by design."
                )]
                (NodeId::new(i as u32, n.generation), n)
            })
        })
    }

    /// Ids of the live nodes, for sweeps that mutate while visiting.
    pub(crate) fn live_ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Parent chain of `id`, nearest first, ending at the root.
    pub(crate) fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut cur = self.get(id).and_then(|n| n.parent);
        core::iter::from_fn(move || {
            let out = cur?;
            cur = self.get(out).and_then(|n| n.parent);
            Some(out)
        })
    }

    /// Structural pre-order walk below `from` (exclusive).
    pub(crate) fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(from).children.iter().rev().copied().collect();
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.node(cur).children.iter().rev().copied());
        }
        out
    }

    /// Verify structural invariants over the body tree and the given display sequence.
    pub(crate) fn check_invariants(
        &self,
        rows_to_display: &[NodeId],
        aggregating: bool,
    ) -> Result<(), InvariantViolation> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack = Vec::from([self.root]);
        while let Some(cur) = stack.pop() {
            let node = self.node(cur);
            for &c in &node.children {
                let Some(child) = self.get(c) else {
                    return Err(InvariantViolation::ParentChildMismatch {
                        parent: node.id.clone(),
                        child: RowId::new("<dangling>"),
                    });
                };
                if child.parent != Some(cur) || !seen.insert(c) {
                    return Err(InvariantViolation::ParentChildMismatch {
                        parent: node.id.clone(),
                        child: child.id.clone(),
                    });
                }
                if child.depth != node.depth + 1 {
                    return Err(InvariantViolation::LevelMismatch(child.id.clone()));
                }
                if self.lookup(child.id.as_str()) != Some(c) {
                    return Err(InvariantViolation::IdIndex(child.id.clone()));
                }
                if aggregating
                    && child.is_group()
                    && child.filter_state.is_visible()
                    && child.aggregates.is_none()
                {
                    return Err(InvariantViolation::StaleAggregate(child.id.clone()));
                }
                stack.push(c);
            }
        }
        for (id, &node_id) in &self.ids {
            if !seen.contains(&node_id) {
                return Err(InvariantViolation::IdIndex(id.clone()));
            }
        }
        for (i, &id) in rows_to_display.iter().enumerate() {
            if self.get(id).and_then(|n| n.display_index) != Some(i) {
                return Err(InvariantViolation::DisplayIndex(i));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tree: &mut Tree<()>, id: &str) -> NodeId {
        tree.insert(RowId::new(id), Some(Rc::new(())), NodeFlags::empty())
    }

    #[test]
    fn liveness_insert_remove_reuse() {
        let mut tree: Tree<()> = Tree::new();
        let root = tree.root();
        let a = leaf(&mut tree, "a");
        tree.link(a, root, None);
        assert!(tree.is_alive(a));

        let removed = tree.remove_subtree(a);
        assert_eq!(removed.len(), 1);
        assert!(!tree.is_alive(a));
        assert_eq!(tree.lookup("a"), None);

        // Reuse slot; old id must remain stale.
        let b = leaf(&mut tree, "b");
        assert!(tree.is_alive(b));
        assert!(!tree.is_alive(a));
        if a.0 == b.0 {
            assert!(b.1 > a.1, "generation must increase on reuse");
        }
    }

    #[test]
    fn link_updates_depth_of_subtree() {
        let mut tree: Tree<()> = Tree::new();
        let root = tree.root();
        let a = leaf(&mut tree, "a");
        let b = leaf(&mut tree, "b");
        let c = leaf(&mut tree, "c");
        tree.link(a, root, None);
        tree.link(b, root, None);
        tree.link(c, b, None);
        assert_eq!(tree.node(c).level(), 1);

        // Move b (with c) under a.
        tree.link(b, a, None);
        assert_eq!(tree.node(b).level(), 1);
        assert_eq!(tree.node(c).level(), 2);
        assert_eq!(tree.node(root).children, Vec::from([a]));
        assert!(tree.check_invariants(&[], false).is_ok());
    }

    #[test]
    fn remove_subtree_frees_descendants() {
        let mut tree: Tree<()> = Tree::new();
        let root = tree.root();
        let a = leaf(&mut tree, "a");
        let b = leaf(&mut tree, "b");
        tree.link(a, root, None);
        tree.link(b, a, None);
        let freed = tree.remove_subtree(a);
        assert_eq!(freed.len(), 2);
        assert!(!tree.is_alive(b));
        assert!(tree.node(root).children.is_empty());
        assert_eq!(tree.ancestors(b).count(), 0);
    }

    #[test]
    fn insert_position_and_ancestors() {
        let mut tree: Tree<()> = Tree::new();
        let root = tree.root();
        let a = leaf(&mut tree, "a");
        let b = leaf(&mut tree, "b");
        let c = leaf(&mut tree, "c");
        tree.link(a, root, None);
        tree.link(b, root, None);
        tree.link(c, root, Some(1));
        assert_eq!(tree.node(root).children, Vec::from([a, c, b]));
        let d = leaf(&mut tree, "d");
        tree.link(d, c, None);
        let chain: Vec<_> = tree.ancestors(d).collect();
        assert_eq!(chain, Vec::from([c, root]));
        assert_eq!(tree.descendants(root), Vec::from([a, c, d, b]));
    }

    #[test]
    fn invariant_check_detects_double_membership() {
        let mut tree: Tree<()> = Tree::new();
        let root = tree.root();
        let a = leaf(&mut tree, "a");
        tree.link(a, root, None);
        tree.node_mut(root).children.push(a);
        assert!(matches!(
            tree.check_invariants(&[], false),
            Err(InvariantViolation::ParentChildMismatch { .. })
        ));
    }
}
