// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors and the warning channel.
//!
//! ## Taxonomy
//!
//! - [`RowModelError`]: API misuse that has no safe default (returned as `Err`).
//! - [`Warning`]: recoverable conditions. The operation is applied partially or a safe
//!   default is used, and the warning is logged and buffered until
//!   [`RowModel::take_warnings`](crate::RowModel::take_warnings).
//! - [`CallbackError`]: returned by user-supplied predicates, comparators and aggregate
//!   functions. The stage excludes the offending node and reports one
//!   [`Warning::CallbackFailed`] per run.
//! - [`InvariantViolation`]: an internal bug detected by
//!   [`RowModel::check_invariants`](crate::RowModel::check_invariants).

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashSet;
use thiserror::Error;

use crate::types::{NodeId, RowId};

/// Errors returned by [`RowModel`](crate::RowModel) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowModelError {
    /// No live node carries this id.
    #[error("no row with id `{0}`")]
    UnknownRow(RowId),
    /// The handle is stale or was never issued by this model.
    #[error("stale node handle {0:?}")]
    StaleNode(NodeId),
    /// The node exists but the operation needs a group.
    #[error("row `{0}` is not a group")]
    NotAGroup(RowId),
}

/// Result alias for row model operations.
pub type Result<T> = core::result::Result<T, RowModelError>;

/// Failure reported by a user-supplied callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CallbackError {
    /// Human readable description.
    pub message: String,
}

impl CallbackError {
    /// Create a callback error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Pipeline stage names, used in warnings and logs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StageName {
    /// Node reconciliation.
    NodeManager,
    /// Filler group derivation.
    Grouping,
    /// Predicate evaluation.
    Filter,
    /// Aggregate computation.
    Aggregation,
    /// Sibling ordering.
    Sort,
    /// Display sequence construction.
    Flatten,
}

impl core::fmt::Display for StageName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::NodeManager => "node manager",
            Self::Grouping => "grouping",
            Self::Filter => "filter",
            Self::Aggregation => "aggregation",
            Self::Sort => "sort",
            Self::Flatten => "flatten",
        })
    }
}

/// Operation that referenced an unknown row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RowOp {
    /// Transaction removal.
    Remove,
    /// Transaction update.
    Update,
    /// Transaction add under a parent.
    AddParent,
}

impl core::fmt::Display for RowOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Remove => "remove",
            Self::Update => "update",
            Self::AddParent => "add under parent",
        })
    }
}

/// Recoverable conditions surfaced through the warning channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Warning {
    /// The same id appeared more than once; the first occurrence was kept.
    #[error("duplicate row id `{0}`; keeping the first occurrence")]
    DuplicateRowId(RowId),
    /// A transaction referenced a row that is not live.
    #[error("{op} references unknown row `{id}`")]
    UnknownRowId {
        /// The operation that failed to match.
        op: RowOp,
        /// The unmatched id (or a generated description for reference matches).
        id: RowId,
    },
    /// A configured field is absent from the records; it is treated as always null.
    #[error("{stage}: field `{field}` is not present on the row data; treating it as null")]
    MissingField {
        /// Stage that read the field.
        stage: StageName,
        /// Field name.
        field: String,
    },
    /// A user callback failed; the offending node was excluded.
    #[error("{stage}: callback failed for row `{id}`: {error}")]
    CallbackFailed {
        /// Stage that invoked the callback.
        stage: StageName,
        /// First row the callback failed on during this run.
        id: RowId,
        /// The callback's error.
        error: CallbackError,
    },
    /// Options that cannot be honored together.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// An internal invariant was violated and the tree was rebuilt.
    #[error("recovered from internal invariant violation: {0}")]
    Recovered(InvariantViolation),
}

/// Internal consistency failures of the node tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A child does not point back to the parent listing it, or is listed twice.
    #[error("node `{child}` membership under `{parent}` is inconsistent")]
    ParentChildMismatch {
        /// Listing parent.
        parent: RowId,
        /// Listed child.
        child: RowId,
    },
    /// A child's level is not its parent's level plus one.
    #[error("node `{0}` has an inconsistent level")]
    LevelMismatch(RowId),
    /// The id index disagrees with the arena.
    #[error("id index entry `{0}` is inconsistent")]
    IdIndex(RowId),
    /// Display indices are not dense and ordered.
    #[error("display index {0} is out of sequence")]
    DisplayIndex(usize),
    /// A group has no aggregates although aggregation is configured.
    #[error("group `{0}` has stale aggregates")]
    StaleAggregate(RowId),
}

/// Buffered warning channel.
///
/// Every warning is logged through `tracing` as it is pushed. A missing field is
/// buffered once per `(stage, field)` until the model that reads it changes,
/// and at most [`Warnings::CAPACITY`] warnings are kept, dropping the oldest.
#[derive(Debug, Default)]
pub struct Warnings {
    buffer: Vec<Warning>,
    reported: HashSet<(StageName, String)>,
    dropped: usize,
}

impl Warnings {
    /// Maximum number of buffered warnings.
    pub const CAPACITY: usize = 256;

    /// Record a warning.
    pub fn push(&mut self, warning: Warning) {
        if let Warning::MissingField { stage, field } = &warning
            && !self.reported.insert((*stage, field.clone()))
        {
            tracing::trace!(%warning, "already reported");
            return;
        }
        tracing::warn!(%warning, "row model warning");
        if self.buffer.len() == Self::CAPACITY {
            self.buffer.remove(0);
            self.dropped += 1;
        }
        self.buffer.push(warning);
    }

    /// Allow missing fields to be reported again, after a model change.
    pub(crate) fn forget_reported(&mut self) {
        self.reported.clear();
    }

    /// Buffered warnings, oldest first.
    pub fn as_slice(&self) -> &[Warning] {
        &self.buffer
    }

    /// Drain the buffer.
    pub fn take(&mut self) -> Vec<Warning> {
        core::mem::take(&mut self.buffer)
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Warnings discarded because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
