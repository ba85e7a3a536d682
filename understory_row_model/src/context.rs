// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-run bookkeeping shared by the pipeline stages.

use alloc::string::{String, ToString};
use hashbrown::HashSet;

use crate::data::RowData;
use crate::error::{CallbackError, StageName, Warning, Warnings};
use crate::types::RowId;
use crate::value::Value;

/// Scratch state for one stage run.
///
/// Configuration problems and callback failures are reported once per run, no
/// matter how many nodes hit them.
pub(crate) struct StageContext<'w> {
    stage: StageName,
    warnings: &'w mut Warnings,
    missing: HashSet<String>,
    callback_reported: bool,
    pub(crate) visited: usize,
}

impl<'w> StageContext<'w> {
    pub(crate) fn new(stage: StageName, warnings: &'w mut Warnings) -> Self {
        Self {
            stage,
            warnings,
            missing: HashSet::new(),
            callback_reported: false,
            visited: 0,
        }
    }

    /// Read `field`, reporting an absent field once and substituting null.
    pub(crate) fn field_value<R: RowData>(&mut self, data: &R, field: &str) -> Value {
        match data.value(field) {
            Some(v) => v,
            None => {
                if !self.missing.contains(field) {
                    self.missing.insert(field.to_string());
                    self.warnings.push(Warning::MissingField {
                        stage: self.stage,
                        field: field.to_string(),
                    });
                }
                Value::Null
            }
        }
    }

    /// Record a callback failure; only the first one per run is surfaced.
    pub(crate) fn callback_failed(&mut self, id: &RowId, error: CallbackError) {
        if self.callback_reported {
            tracing::trace!(stage = %self.stage, %id, %error, "suppressed repeated callback failure");
            return;
        }
        self.callback_reported = true;
        self.warnings.push(Warning::CallbackFailed {
            stage: self.stage,
            id: id.clone(),
            error,
        });
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}
