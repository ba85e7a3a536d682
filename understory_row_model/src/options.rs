// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Serializable row model configuration.

use serde::{Deserialize, Serialize};

/// Options controlling how the row model builds and presents the tree.
///
/// Only plain data lives here so configurations can be persisted; functions
/// (row ids, comparators, predicates) are configured on the
/// [`RowModel`](crate::RowModel) itself.
///
/// Missing fields deserialize to their defaults:
///
/// ```
/// use understory_row_model::RowModelOptions;
///
/// let opts: RowModelOptions = serde_json::from_str(r#"{ "tree_data": true }"#).unwrap();
/// assert!(opts.tree_data);
/// assert_eq!(opts.group_default_expanded, 0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowModelOptions {
    /// Records carry their children ([`RowData::children`](crate::RowData::children)); the
    /// nesting is the tree and no filler groups are created.
    pub tree_data: bool,
    /// Levels expanded when a group is first created: `0` none, `n` the first `n`
    /// levels, `-1` all.
    pub group_default_expanded: i32,
    /// Also compute aggregates at the synthetic root.
    pub aggregate_root: bool,
    /// Aggregate over all children instead of only the filtered-in ones.
    pub suppress_agg_filtered_only: bool,
    /// Forwarded in [`ModelUpdated`](crate::ModelUpdated) so renderers can animate.
    pub animate_rows: bool,
    /// Uniform row height used by the bounds interface.
    pub row_height: f64,
    /// Check tree invariants after every pipeline run. `None` means "in debug builds".
    pub verify_invariants: Option<bool>,
}

impl Default for RowModelOptions {
    fn default() -> Self {
        Self {
            tree_data: false,
            group_default_expanded: 0,
            aggregate_root: false,
            suppress_agg_filtered_only: false,
            animate_rows: false,
            row_height: 25.0,
            verify_invariants: None,
        }
    }
}

impl RowModelOptions {
    /// Options for hierarchical (children-field) input.
    pub fn tree_data() -> Self {
        Self {
            tree_data: true,
            ..Self::default()
        }
    }

    /// Builder-style setter for [`Self::group_default_expanded`].
    pub fn with_group_default_expanded(mut self, levels: i32) -> Self {
        self.group_default_expanded = levels;
        self
    }

    /// Builder-style setter for [`Self::aggregate_root`].
    pub fn with_aggregate_root(mut self, enabled: bool) -> Self {
        self.aggregate_root = enabled;
        self
    }

    /// Whether a group created at `level` starts expanded.
    pub fn expands_level(&self, level: u32) -> bool {
        match self.group_default_expanded {
            -1 => true,
            n if n <= 0 => false,
            n => level < n.unsigned_abs(),
        }
    }

    pub(crate) fn verifies_invariants(&self) -> bool {
        self.verify_invariants.unwrap_or(cfg!(debug_assertions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_expansion_levels() {
        let none = RowModelOptions::default();
        assert!(!none.expands_level(0));
        let all = RowModelOptions::default().with_group_default_expanded(-1);
        assert!(all.expands_level(7));
        let one = RowModelOptions::default().with_group_default_expanded(1);
        assert!(one.expands_level(0));
        assert!(!one.expands_level(1));
    }

    #[test]
    fn json_round_trip() {
        let opts = RowModelOptions {
            aggregate_root: true,
            row_height: 30.0,
            ..RowModelOptions::tree_data()
        };
        let json = serde_json::to_string(&opts).unwrap();
        let back: RowModelOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
    }
}
