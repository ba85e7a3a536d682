// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change notifications emitted after pipeline runs.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::types::RowId;

/// Payload of [`ModelEvent::ModelUpdated`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelUpdated {
    /// Renderers may animate row movement.
    pub animate: bool,
    /// The row data was replaced wholesale.
    pub new_data: bool,
    /// Rows that are still displayed can keep their rendered state.
    pub keep_rendered_rows: bool,
}

/// Notification delivered to listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelEvent {
    /// The display sequence was rebuilt.
    ModelUpdated(ModelUpdated),
    /// A full reload completed; every display index up to the row count is valid.
    RowCountReady,
    /// Selected rows disappeared from the tree.
    SelectedRowsRemoved(Vec<RowId>),
}

/// Handle returned by [`RowModel::add_event_listener`](crate::RowModel::add_event_listener).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ModelEvent)>;

/// Registered listeners, notified in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    next: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl core::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: impl FnMut(&ModelEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.push((id, Box::new(listener)));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(l, _)| *l != id);
        self.entries.len() != before
    }

    pub(crate) fn emit(&mut self, event: &ModelEvent) {
        tracing::trace!(?event, listeners = self.entries.len(), "emit");
        for (_, listener) in &mut self.entries {
            listener(event);
        }
    }
}
