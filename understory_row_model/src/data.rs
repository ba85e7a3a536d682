// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Record access: the [`RowData`] trait and the map-backed [`MapRow`].

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::value::Value;

/// Read access to a caller record.
///
/// The row model holds records as `Rc<R>` and never copies or mutates them; it only
/// reads fields through this trait. A `None` from [`RowData::value`] means the field
/// does not exist, which the stages report as a configuration warning and treat as
/// [`Value::Null`].
pub trait RowData {
    /// Value of `field`, or `None` if the record has no such field.
    fn value(&self, field: &str) -> Option<Value>;

    /// Child records for hierarchical input.
    ///
    /// Only consulted in tree-data mode, see [`RowModelOptions::tree_data()`](crate::RowModelOptions::tree_data()).
    fn children(&self) -> Option<&[Rc<Self>]>
    where
        Self: Sized,
    {
        None
    }
}

/// A dynamic record: named fields plus optional children.
///
/// ```
/// use understory_row_model::{MapRow, RowData, Value};
///
/// let row = MapRow::new().with("id", "A").with("v", 1);
/// assert_eq!(row.value("v"), Some(Value::Int(1)));
/// assert_eq!(row.value("missing"), None);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MapRow {
    fields: BTreeMap<String, Value>,
    children: Option<Vec<Rc<Self>>>,
}

impl MapRow {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Builder-style children setter.
    pub fn with_children(mut self, children: impl IntoIterator<Item = Rc<Self>>) -> Self {
        self.children = Some(children.into_iter().collect());
        self
    }

    /// Set a field in place.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Field rendered as a key string; empty when the field is absent or null.
    pub fn value_str(&self, field: &str) -> String {
        self.fields.get(field).map(Value::key_string).unwrap_or_default()
    }

    /// Wrap into the shared form the row model consumes.
    pub fn shared(self) -> Rc<Self> {
        Rc::new(self)
    }
}

impl RowData for MapRow {
    fn value(&self, field: &str) -> Option<Value> {
        self.fields.get(field).cloned()
    }

    fn children(&self) -> Option<&[Rc<Self>]> {
        self.children.as_deref()
    }
}
