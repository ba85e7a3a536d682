// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Aggregation stage: per-group aggregate values, computed bottom-up.
//!
//! ## Combination
//!
//! Built-in functions combine from a group's *direct* children: a child group
//! contributes its already-computed cell, a leaf contributes its raw field value.
//! `Avg` carries a running sum/count so averages of averages stay exact.
//! [`AggFunc::Custom`] cannot combine partial results, so it is handed the raw
//! values of every leaf descendant instead.
//!
//! ## Incremental runs
//!
//! After a transaction only the nodes on the [`ChangedPath`] are recomputed,
//! deepest first, so every group is combined after all of its children.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use crate::change::ChangedPath;
use crate::context::StageContext;
use crate::data::RowData;
use crate::error::{CallbackError, StageName, Warnings};
use crate::options::RowModelOptions;
use crate::tree::Tree;
use crate::types::{NodeFlags, NodeId};
use crate::value::Value;

/// User aggregate over raw leaf values.
pub type AggCallback = Rc<dyn Fn(&[Value]) -> Result<Value, CallbackError>>;

/// Aggregation function of one column.
#[derive(Clone)]
pub enum AggFunc {
    /// Sum of numeric values. Integers stay integers until a float is seen.
    Sum,
    /// Smallest non-null value.
    Min,
    /// Largest non-null value.
    Max,
    /// Number of leaf rows.
    Count,
    /// Mean of numeric values.
    Avg,
    /// Value of the first child in input order.
    First,
    /// Value of the last child in input order.
    Last,
    /// User function over the raw leaf values.
    Custom(AggCallback),
}

impl AggFunc {
    /// Wrap a closure as a custom aggregate.
    pub fn custom(f: impl Fn(&[Value]) -> Result<Value, CallbackError> + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }

    /// Whether the function can be recombined from child aggregates.
    pub fn combines_incrementally(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Debug for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sum => "Sum",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::Count => "Count",
            Self::Avg => "Avg",
            Self::First => "First",
            Self::Last => "Last",
            Self::Custom(_) => "Custom(..)",
        })
    }
}

/// Ordered list of aggregated columns.
#[derive(Clone, Debug, Default)]
pub struct AggregationModel {
    columns: Vec<(Rc<str>, AggFunc)>,
}

impl AggregationModel {
    /// Create an empty model (no aggregation).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column registration. Re-registering a field replaces its function.
    pub fn with(mut self, field: &str, func: AggFunc) -> Self {
        if let Some(slot) = self.columns.iter_mut().find(|(f, _)| &**f == field) {
            slot.1 = func;
        } else {
            self.columns.push((Rc::from(field), func));
        }
        self
    }

    /// True if no column is aggregated.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Whether `field` is aggregated.
    pub fn contains(&self, field: &str) -> bool {
        self.columns.iter().any(|(f, _)| &**f == field)
    }

    /// Aggregated columns in registration order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &AggFunc)> + '_ {
        self.columns.iter().map(|(f, func)| (&**f, func))
    }
}

/// Partial state needed to recombine a cell.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Partial {
    None,
    Mean { sum: f64, count: u64 },
}

/// One aggregated value on a group.
#[derive(Clone, Debug)]
pub(crate) struct AggCell {
    pub(crate) field: Rc<str>,
    pub(crate) value: Value,
    partial: Partial,
}

/// Running combination of contributions for one column.
struct Accumulator<'f> {
    func: &'f AggFunc,
    int_sum: i128,
    float_sum: f64,
    has_float: bool,
    numeric: u64,
    count: i64,
    best: Option<Value>,
    first: Option<Value>,
    last: Option<Value>,
}

impl<'f> Accumulator<'f> {
    fn new(func: &'f AggFunc) -> Self {
        Self {
            func,
            int_sum: 0,
            float_sum: 0.0,
            has_float: false,
            numeric: 0,
            count: 0,
            best: None,
            first: None,
            last: None,
        }
    }

    fn add_number(&mut self, v: &Value) {
        match *v {
            Value::Int(i) => {
                self.int_sum += i128::from(i);
                self.numeric += 1;
            }
            Value::Float(f) => {
                self.float_sum += f;
                self.has_float = true;
                self.numeric += 1;
            }
            _ => {}
        }
    }

    fn add_extreme(&mut self, v: Value, want: core::cmp::Ordering) {
        if v.is_null() {
            return;
        }
        let replace = match &self.best {
            Some(b) => v.compare(b) == want,
            None => true,
        };
        if replace {
            self.best = Some(v);
        }
    }

    fn add_ordered(&mut self, v: Value) {
        if self.first.is_none() {
            self.first = Some(v.clone());
        }
        self.last = Some(v);
    }

    /// Contribution of a leaf row.
    fn add_leaf(&mut self, v: Value) {
        match self.func {
            AggFunc::Sum => self.add_number(&v),
            AggFunc::Avg => {
                if let Some(f) = v.as_f64() {
                    self.float_sum += f;
                    self.numeric += 1;
                }
            }
            AggFunc::Count => self.count += 1,
            AggFunc::Min => self.add_extreme(v, core::cmp::Ordering::Less),
            AggFunc::Max => self.add_extreme(v, core::cmp::Ordering::Greater),
            AggFunc::First | AggFunc::Last => self.add_ordered(v),
            AggFunc::Custom(_) => {}
        }
    }

    /// Contribution of a child group's cell.
    fn add_cell(&mut self, cell: &AggCell) {
        match (self.func, &cell.partial) {
            (AggFunc::Avg, Partial::Mean { sum, count }) => {
                self.float_sum += sum;
                self.numeric += count;
            }
            (AggFunc::Avg, Partial::None) => {}
            (AggFunc::Count, _) => {
                if let Value::Int(n) = cell.value {
                    self.count += n;
                }
            }
            _ => self.add_leaf(cell.value.clone()),
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        reason = "Mixed integer/float sums are reported as f64."
    )]
    fn finish(self, field: Rc<str>) -> AggCell {
        let (value, partial) = match self.func {
            AggFunc::Sum if self.numeric == 0 => (Value::Null, Partial::None),
            AggFunc::Sum if self.has_float => (
                Value::Float(self.float_sum + self.int_sum as f64),
                Partial::None,
            ),
            AggFunc::Sum => (
                i64::try_from(self.int_sum)
                    .map(Value::Int)
                    .unwrap_or(Value::Float(self.int_sum as f64)),
                Partial::None,
            ),
            AggFunc::Avg => {
                let value = if self.numeric == 0 {
                    Value::Null
                } else {
                    Value::Float(self.float_sum / self.numeric as f64)
                };
                (
                    value,
                    Partial::Mean {
                        sum: self.float_sum,
                        count: self.numeric,
                    },
                )
            }
            AggFunc::Count => (Value::Int(self.count), Partial::None),
            AggFunc::Min | AggFunc::Max => (self.best.unwrap_or_default(), Partial::None),
            AggFunc::First => (self.first.unwrap_or_default(), Partial::None),
            AggFunc::Last => (self.last.unwrap_or_default(), Partial::None),
            AggFunc::Custom(_) => (Value::Null, Partial::None),
        };
        AggCell {
            field,
            value,
            partial,
        }
    }
}

/// Recompute aggregates for the whole tree or the changed path.
///
/// Returns the number of nodes visited.
#[tracing::instrument(skip_all, fields(scoped = path.is_some()))]
pub(crate) fn run<R: RowData>(
    tree: &mut Tree<R>,
    model: &AggregationModel,
    options: &RowModelOptions,
    path: Option<&ChangedPath>,
    warnings: &mut Warnings,
) -> usize {
    let mut ctx = StageContext::new(StageName::Aggregation, warnings);
    let order = match path {
        Some(path) => path.bottom_up(tree),
        None => {
            let root = tree.root();
            let mut all = tree.descendants(root);
            all.insert(0, root);
            all.reverse();
            all
        }
    };
    let filtered_only = !options.suppress_agg_filtered_only;
    for id in order {
        ctx.visited += 1;
        let (is_group, is_root) = {
            let n = tree.node(id);
            (n.is_group(), n.flags.contains(NodeFlags::ROOT))
        };
        let leaf_count = if is_group {
            let n = tree.node(id);
            n.children
                .iter()
                .map(|&c| {
                    let child = tree.node(c);
                    if child.is_group() { child.leaf_count } else { 1 }
                })
                .sum()
        } else {
            0
        };
        let wants_aggs = is_group && !model.is_empty() && (!is_root || options.aggregate_root);
        let cells = wants_aggs.then(|| aggregate_node(tree, id, model, filtered_only, &mut ctx));
        let node = tree.node_mut(id);
        // A node that just lost its children may still cache its old aggregate.
        if is_group || node.aggregates.is_some() {
            node.sort_key = None;
        }
        node.leaf_count = leaf_count;
        node.aggregates = cells;
    }
    tracing::debug!(visited = ctx.visited, "aggregation complete");
    ctx.visited
}

fn aggregate_node<R: RowData>(
    tree: &Tree<R>,
    id: NodeId,
    model: &AggregationModel,
    filtered_only: bool,
    ctx: &mut StageContext<'_>,
) -> Vec<AggCell> {
    let node = tree.node(id);
    let children = if filtered_only {
        &node.children_after_filter
    } else {
        &node.children
    };
    let mut cells = Vec::with_capacity(model.columns.len());
    for (col, (field, func)) in model.columns.iter().enumerate() {
        if let AggFunc::Custom(f) = func {
            let values = leaf_values(tree, id, field, filtered_only, ctx);
            let value = match f(&values) {
                Ok(v) => v,
                Err(e) => {
                    ctx.callback_failed(&node.id, e);
                    Value::Null
                }
            };
            cells.push(AggCell {
                field: field.clone(),
                value,
                partial: Partial::None,
            });
            continue;
        }
        let mut acc = Accumulator::new(func);
        for &c in children {
            let child = tree.node(c);
            match child.aggregates.as_ref().and_then(|a| a.get(col)) {
                Some(cell) if child.is_group() => acc.add_cell(cell),
                _ if child.is_group() => {}
                _ => {
                    let v = match &child.data {
                        Some(data) => ctx.field_value(&**data, field),
                        None => Value::Null,
                    };
                    acc.add_leaf(v);
                }
            }
        }
        cells.push(acc.finish(field.clone()));
    }
    cells
}

/// Raw values of every leaf below `id`, in input order.
fn leaf_values<R: RowData>(
    tree: &Tree<R>,
    id: NodeId,
    field: &str,
    filtered_only: bool,
    ctx: &mut StageContext<'_>,
) -> Vec<Value> {
    let mut out = Vec::new();
    let mut stack = Vec::from([id]);
    while let Some(cur) = stack.pop() {
        let node = tree.node(cur);
        if node.is_group() {
            let children = if filtered_only {
                &node.children_after_filter
            } else {
                &node.children
            };
            stack.extend(children.iter().rev().copied());
        } else if let Some(data) = &node.data {
            out.push(ctx.field_value(&**data, field));
        }
    }
    out
}
