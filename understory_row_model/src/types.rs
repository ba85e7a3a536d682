// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the row model: node handles, row ids, flags, and per-node state.

use alloc::rc::Rc;
use alloc::string::String;
use core::borrow::Borrow;
use core::fmt;

/// Arena handle of a row node.
///
/// This is a small, copyable handle that stays stable across updates but becomes
/// invalid when the underlying slot is reused.
/// It consists of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On insert, a fresh slot is allocated with generation `1`.
/// - On remove, the slot is freed; any existing `NodeId` that pointed to that slot is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new, distinct `NodeId`.
///
/// Two handles compare equal exactly when they name the same node object, so a
/// `NodeId` that survives [`RowModel::set_row_data`](crate::RowModel::set_row_data)
/// means the node kept its identity (and with it its expansion and selection state).
///
/// ### Liveness
///
/// Use [`RowModel::is_alive`](crate::RowModel::is_alive) to check whether a `NodeId` still refers to a live node.
/// Stale `NodeId`s never alias a different live node because the generation must match.
///
/// ### Notes
///
/// - The generation increments on slot reuse and never decreases.
/// - `u32` is ample for practical lifetimes; behavior on generation overflow is unspecified.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Caller-visible row identifier.
///
/// Row ids are either produced by the configured row-id function or generated
/// internally. Filler groups get ids derived from their grouping path, see
/// [`grouping`](crate::grouping).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(Rc<str>);

impl RowId {
    /// Create a row id from anything string-like.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Rc::from(id.as_ref()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RowId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        Self(Rc::from(value))
    }
}

bitflags::bitflags! {
    /// Structural and UI state bits of a node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        /// Node is a grouping boundary (filler group or tree branch).
        const GROUP         = 0b0000_0001;
        /// Node was synthesized by grouping and carries no record.
        const FILLER        = 0b0000_0010;
        /// Group is expanded.
        const EXPANDED      = 0b0000_0100;
        /// Node is selected.
        const SELECTED      = 0b0000_1000;
        /// Synthetic root of the tree.
        const ROOT          = 0b0001_0000;
        /// Row pinned above the body rows.
        const PINNED_TOP    = 0b0010_0000;
        /// Row pinned below the body rows.
        const PINNED_BOTTOM = 0b0100_0000;
    }
}

/// Result of the filter stage for one node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterState {
    /// The node's own values pass every active predicate.
    #[default]
    Pass,
    /// A group whose own values fail (or that has none), kept because a descendant passes.
    PassViaDescendant,
    /// Excluded from the filtered tree.
    Fail,
}

impl FilterState {
    /// True unless the node is filtered out.
    pub const fn is_visible(self) -> bool {
        !matches!(self, Self::Fail)
    }
}

/// Why a node does or does not occupy a display index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DisplayState {
    /// Present in the flattened sequence at the given index.
    Displayed(usize),
    /// Filtered in, but an ancestor group is collapsed.
    Collapsed,
    /// The node, or one of its ancestors, is filtered out.
    FilteredOut,
}

/// Vertical extent of a displayed row.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RowBounds {
    /// Offset of the row's top edge from the top of the first row.
    pub top: f64,
    /// Row height.
    pub height: f64,
}
