// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Filter stage: predicate evaluation and upward visibility propagation.
//!
//! ## Semantics
//!
//! - A leaf passes when every active predicate accepts its field values.
//! - A group fails when none of its children pass. Otherwise it is
//!   [`FilterState::Pass`] if its own record passes (tree data) and
//!   [`FilterState::PassViaDescendant`] if it fails or has no record (filler groups).
//! - `children_after_filter` keeps the non-failing children in input order.
//!
//! After a transaction only nodes on the [`ChangedPath`] are re-evaluated, deepest
//! first; everything else keeps the state from the previous run.

use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

use crate::change::ChangedPath;
use crate::context::StageContext;
use crate::data::RowData;
use crate::error::{CallbackError, StageName, Warnings};
use crate::tree::Tree;
use crate::types::{FilterState, NodeId};
use crate::value::Value;

/// User predicate over one field value.
pub type PredicateCallback = Rc<dyn Fn(&Value) -> Result<bool, CallbackError>>;

/// Condition applied to one field.
#[derive(Clone)]
pub enum Predicate {
    /// Equal to the operand.
    Equals(Value),
    /// Not equal to the operand (null values pass).
    NotEqual(Value),
    /// Strictly less than the operand.
    LessThan(Value),
    /// Less than or equal to the operand.
    LessThanOrEqual(Value),
    /// Strictly greater than the operand.
    GreaterThan(Value),
    /// Greater than or equal to the operand.
    GreaterThanOrEqual(Value),
    /// Within `[from, to]`, inclusive.
    InRange(Value, Value),
    /// Text form contains the needle, ignoring case.
    Contains(String),
    /// Text form starts with the prefix, ignoring case.
    StartsWith(String),
    /// Text form ends with the suffix, ignoring case.
    EndsWith(String),
    /// Null or empty text.
    Blank,
    /// Neither null nor empty text.
    NotBlank,
    /// Equal to one of the listed values (set filter).
    OneOf(Vec<Value>),
    /// User predicate.
    Custom(PredicateCallback),
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Self::NotEqual(v) => f.debug_tuple("NotEqual").field(v).finish(),
            Self::LessThan(v) => f.debug_tuple("LessThan").field(v).finish(),
            Self::LessThanOrEqual(v) => f.debug_tuple("LessThanOrEqual").field(v).finish(),
            Self::GreaterThan(v) => f.debug_tuple("GreaterThan").field(v).finish(),
            Self::GreaterThanOrEqual(v) => f.debug_tuple("GreaterThanOrEqual").field(v).finish(),
            Self::InRange(a, b) => f.debug_tuple("InRange").field(a).field(b).finish(),
            Self::Contains(s) => f.debug_tuple("Contains").field(s).finish(),
            Self::StartsWith(s) => f.debug_tuple("StartsWith").field(s).finish(),
            Self::EndsWith(s) => f.debug_tuple("EndsWith").field(s).finish(),
            Self::Blank => f.write_str("Blank"),
            Self::NotBlank => f.write_str("NotBlank"),
            Self::OneOf(vs) => f.debug_tuple("OneOf").field(vs).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Predicate {
    /// Wrap a closure as a custom predicate.
    pub fn custom(f: impl Fn(&Value) -> Result<bool, CallbackError> + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }

    /// Evaluate against one value.
    pub fn test(&self, v: &Value) -> Result<bool, CallbackError> {
        let blank = match v {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        };
        let cmp = |operand: &Value| (!v.is_null()).then(|| v.compare(operand));
        Ok(match self {
            Self::Equals(o) => cmp(o) == Some(Ordering::Equal),
            Self::NotEqual(o) => cmp(o) != Some(Ordering::Equal),
            Self::LessThan(o) => cmp(o) == Some(Ordering::Less),
            Self::LessThanOrEqual(o) => matches!(cmp(o), Some(Ordering::Less | Ordering::Equal)),
            Self::GreaterThan(o) => cmp(o) == Some(Ordering::Greater),
            Self::GreaterThanOrEqual(o) => {
                matches!(cmp(o), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::InRange(from, to) => {
                matches!(cmp(from), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(cmp(to), Some(Ordering::Less | Ordering::Equal))
            }
            Self::Contains(needle) => text_of(v).is_some_and(|t| t.contains(&needle.to_lowercase())),
            Self::StartsWith(p) => text_of(v).is_some_and(|t| t.starts_with(&p.to_lowercase())),
            Self::EndsWith(s) => text_of(v).is_some_and(|t| t.ends_with(&s.to_lowercase())),
            Self::Blank => blank,
            Self::NotBlank => !blank,
            Self::OneOf(values) => values.iter().any(|o| cmp(o) == Some(Ordering::Equal)),
            Self::Custom(f) => return f(v),
        })
    }
}

/// Lower-cased text form for the text predicates.
fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Text(s) => Some(s.to_lowercase()),
        other => Some(other.to_string().to_lowercase()),
    }
}

/// Active predicates, one per field, combined conjunctively.
#[derive(Clone, Debug, Default)]
pub struct FilterModel {
    predicates: Vec<(Rc<str>, Predicate)>,
}

impl FilterModel {
    /// Create an empty model (everything passes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style predicate registration; replaces an existing predicate on `field`.
    pub fn with(mut self, field: &str, predicate: Predicate) -> Self {
        self.set(field, Some(predicate));
        self
    }

    /// Set or clear the predicate of `field`.
    pub fn set(&mut self, field: &str, predicate: Option<Predicate>) {
        let pos = self.predicates.iter().position(|(f, _)| &**f == field);
        match (pos, predicate) {
            (Some(i), Some(p)) => self.predicates[i].1 = p,
            (Some(i), None) => {
                self.predicates.remove(i);
            }
            (None, Some(p)) => self.predicates.push((Rc::from(field), p)),
            (None, None) => {}
        }
    }

    /// True if no predicate is active.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Active predicates in registration order.
    pub fn predicates(&self) -> impl Iterator<Item = (&str, &Predicate)> + '_ {
        self.predicates.iter().map(|(f, p)| (&**f, p))
    }

    fn passes<R: RowData>(&self, data: &R, id: NodeId, tree: &Tree<R>, ctx: &mut StageContext<'_>) -> bool {
        for (field, predicate) in &self.predicates {
            let v = ctx.field_value(data, field);
            match predicate.test(&v) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    ctx.callback_failed(&tree.node(id).id, e);
                    return false;
                }
            }
        }
        true
    }
}

/// Re-evaluate filter state for the whole tree or the changed path.
///
/// Returns the number of nodes visited.
#[tracing::instrument(skip_all, fields(scoped = path.is_some()))]
pub(crate) fn run<R: RowData>(
    tree: &mut Tree<R>,
    model: &FilterModel,
    path: Option<&ChangedPath>,
    warnings: &mut Warnings,
) -> usize {
    let mut ctx = StageContext::new(StageName::Filter, warnings);
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
    for id in order {
        ctx.visited += 1;
        let (state, after_filter) = evaluate(tree, id, model, &mut ctx);
        let node = tree.node_mut(id);
        node.filter_state = state;
        if let Some(after) = after_filter {
            node.children_after_filter = after;
        }
    }
    tracing::debug!(visited = ctx.visited, "filter complete");
    ctx.visited
}

fn evaluate<R: RowData>(
    tree: &Tree<R>,
    id: NodeId,
    model: &FilterModel,
    ctx: &mut StageContext<'_>,
) -> (FilterState, Option<Vec<NodeId>>) {
    let node = tree.node(id);
    let own_pass = match &node.data {
        Some(data) if !model.is_empty() => model.passes(&**data, id, tree, ctx),
        _ => true,
    };
    if !node.is_group() {
        let state = if own_pass { FilterState::Pass } else { FilterState::Fail };
        return (state, Some(Vec::new()));
    }
    let after: Vec<NodeId> = node
        .children
        .iter()
        .copied()
        .filter(|&c| tree.node(c).filter_state.is_visible())
        .collect();
    let state = if model.is_empty() || node.parent.is_none() {
        FilterState::Pass
    } else if after.is_empty() {
        FilterState::Fail
    } else if node.data.is_some() && own_pass {
        FilterState::Pass
    } else {
        FilterState::PassViaDescendant
    };
    (state, Some(after))
}
