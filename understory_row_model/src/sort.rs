// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sort stage: stable, per-level multi-key ordering of sibling arrays.
//!
//! ## Sort values
//!
//! - Leaves sort on their record's field values.
//! - Filler groups sort on their group key when the sort field is the field they
//!   group by, on their aggregate when the field is aggregated, and on null otherwise.
//! - Tree-data groups sort on their aggregate if present, else on their own record.
//!
//! Null sorts last in both directions. Ties fall back to the
//! [group order comparator](SortModel::with_group_order) for filler groups and
//! then to input order.
//!
//! Sort values are cached on the node and tagged with the sort model epoch, so a
//! transaction only recomputes values for the nodes it touched.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::change::ChangedPath;
use crate::context::StageContext;
use crate::data::RowData;
use crate::error::{CallbackError, StageName, Warnings};
use crate::tree::Tree;
use crate::types::{NodeFlags, NodeId};
use crate::value::Value;

/// User comparator over two non-null values.
pub type SortCallback = Rc<dyn Fn(&Value, &Value) -> Result<Ordering, CallbackError>>;

/// Direction of one sort key.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Ascending => ord,
            Self::Descending => ord.reverse(),
        }
    }
}

/// One `(field, direction, comparator)` entry of a [`SortModel`].
#[derive(Clone)]
pub struct SortKey {
    /// Field to sort on.
    pub field: Rc<str>,
    /// Direction.
    pub direction: SortDirection,
    /// Replaces [`Value::compare`] for non-null values.
    pub comparator: Option<SortCallback>,
}

impl SortKey {
    /// Ascending key on `field`.
    pub fn asc(field: &str) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    /// Descending key on `field`.
    pub fn desc(field: &str) -> Self {
        Self::new(field, SortDirection::Descending)
    }

    /// Key on `field` with an explicit direction.
    pub fn new(field: &str, direction: SortDirection) -> Self {
        Self {
            field: Rc::from(field),
            direction,
            comparator: None,
        }
    }

    /// Attach a custom comparator.
    pub fn with_comparator(
        mut self,
        f: impl Fn(&Value, &Value) -> Result<Ordering, CallbackError> + 'static,
    ) -> Self {
        self.comparator = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortKey")
            .field("field", &self.field)
            .field("direction", &self.direction)
            .field("comparator", &self.comparator.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Ordered sort keys plus an optional tie-breaker for filler groups.
#[derive(Clone, Default)]
pub struct SortModel {
    keys: Vec<SortKey>,
    group_order: Option<SortCallback>,
}

impl fmt::Debug for SortModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortModel")
            .field("keys", &self.keys)
            .field("group_order", &self.group_order.is_some())
            .finish()
    }
}

impl SortModel {
    /// Create an empty model (input order).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style key registration; keys apply in registration order.
    pub fn with(mut self, key: SortKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Comparator over group keys, consulted when two filler groups tie on every key.
    pub fn with_group_order(
        mut self,
        f: impl Fn(&Value, &Value) -> Result<Ordering, CallbackError> + 'static,
    ) -> Self {
        self.group_order = Some(Rc::new(f));
        self
    }

    /// True if sorting leaves every sibling array in input order.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.group_order.is_none()
    }

    /// Sort keys in priority order.
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Drop every key whose field an earlier key already sorts on.
    ///
    /// Returns the fields that were listed more than once.
    pub(crate) fn dedup_keys(&mut self) -> Vec<Rc<str>> {
        let mut seen: HashSet<Rc<str>> = HashSet::new();
        let mut conflicts = Vec::new();
        self.keys.retain(|key| {
            let first = seen.insert(key.field.clone());
            if !first && !conflicts.contains(&key.field) {
                conflicts.push(key.field.clone());
            }
            first
        });
        conflicts
    }
}

/// Sort inputs of one sibling.
struct Entry {
    id: NodeId,
    values: Vec<Value>,
    group_key: Option<Value>,
}

/// Re-sort sibling arrays for the whole tree or the changed path.
///
/// `epoch` identifies the current sort model; cached values from another epoch
/// are recomputed. Returns the number of sibling arrays sorted.
#[tracing::instrument(skip_all, fields(scoped = path.is_some(), epoch = epoch))]
pub(crate) fn run<R: RowData>(
    tree: &mut Tree<R>,
    model: &SortModel,
    epoch: u64,
    path: Option<&ChangedPath>,
    warnings: &mut Warnings,
) -> usize {
    let mut ctx = StageContext::new(StageName::Sort, warnings);
    let parents: Vec<NodeId> = match path {
        Some(path) => path.bottom_up(tree),
        None => {
            let root = tree.root();
            let mut all = tree.descendants(root);
            all.insert(0, root);
            all
        }
    };
    for parent in parents {
        if !tree.node(parent).is_group() {
            tree.node_mut(parent).children_after_sort.clear();
            continue;
        }
        ctx.visited += 1;
        let children = tree.node(parent).children_after_filter.clone();
        let sorted = if model.is_empty() || children.len() < 2 {
            children
        } else {
            sort_siblings(tree, model, epoch, children, &mut ctx)
        };
        tree.node_mut(parent).children_after_sort = sorted;
    }
    tracing::debug!(sorted = ctx.visited, "sort complete");
    ctx.visited
}

fn sort_siblings<R: RowData>(
    tree: &mut Tree<R>,
    model: &SortModel,
    epoch: u64,
    children: Vec<NodeId>,
    ctx: &mut StageContext<'_>,
) -> Vec<NodeId> {
    let mut entries: Vec<Entry> = children
        .into_iter()
        .map(|id| {
            let values = sort_values(tree, id, model, epoch, ctx);
            let node = tree.node(id);
            let group_key = node
                .flags
                .contains(NodeFlags::FILLER)
                .then(|| node.group.as_ref().map(|g| g.key.clone()))
                .flatten();
            Entry {
                id,
                values,
                group_key,
            }
        })
        .collect();
    // `sort_by` is stable, so ties keep input order.
    entries.sort_by(|a, b| compare_entries(tree, model, a, b, ctx));
    entries.into_iter().map(|e| e.id).collect()
}

fn compare_entries<R>(
    tree: &Tree<R>,
    model: &SortModel,
    a: &Entry,
    b: &Entry,
    ctx: &mut StageContext<'_>,
) -> Ordering {
    for (i, key) in model.keys.iter().enumerate() {
        let (va, vb) = (&a.values[i], &b.values[i]);
        let ord = match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = match &key.comparator {
                    Some(f) => user_order(f, va, vb, tree, a.id, ctx),
                    None => va.compare(vb),
                };
                key.direction.apply(ord)
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    match (&model.group_order, &a.group_key, &b.group_key) {
        (Some(f), Some(ka), Some(kb)) => user_order(f, ka, kb, tree, a.id, ctx),
        _ => Ordering::Equal,
    }
}

fn user_order<R>(
    f: &SortCallback,
    a: &Value,
    b: &Value,
    tree: &Tree<R>,
    id: NodeId,
    ctx: &mut StageContext<'_>,
) -> Ordering {
    f(a, b).unwrap_or_else(|e| {
        ctx.callback_failed(&tree.node(id).id, e);
        Ordering::Equal
    })
}

/// Sort values of `id` for every key, from the cache when it matches `epoch`.
fn sort_values<R: RowData>(
    tree: &mut Tree<R>,
    id: NodeId,
    model: &SortModel,
    epoch: u64,
    ctx: &mut StageContext<'_>,
) -> Vec<Value> {
    if let Some((e, values)) = &tree.node(id).sort_key
        && *e == epoch
    {
        return values.clone();
    }
    let node = tree.node(id);
    let values: Vec<Value> = model
        .keys
        .iter()
        .map(|key| {
            let field = &*key.field;
            let aggregate = node
                .aggregates
                .as_ref()
                .and_then(|cells| cells.iter().find(|c| &*c.field == field))
                .map(|c| c.value.clone());
            if node.flags.contains(NodeFlags::FILLER) {
                match (&node.group, aggregate) {
                    (Some(g), _) if &*g.field == field => g.key.clone(),
                    (_, Some(v)) => v,
                    _ => Value::Null,
                }
            } else if let Some(v) = aggregate.filter(|_| node.is_group()) {
                v
            } else {
                match &node.data {
                    Some(data) => ctx.field_value(&**data, field),
                    None => Value::Null,
                }
            }
        })
        .collect();
    tree.node_mut(id).sort_key = Some((epoch, values.clone()));
    values
}
