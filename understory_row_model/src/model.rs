// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The row model orchestrator.
//!
//! [`RowModel`] owns the node tree and runs the pipeline
//!
//! ```text
//! node manager -> grouping -> filter -> aggregation -> sort -> flatten
//! ```
//!
//! after every mutation. Each mutation is classified as a [`ChangeKind`] and only
//! the stages in [`ChangeKind::stages`] re-run. Transactions additionally bound
//! every stage to the ancestor chains of the rows they touched.

use alloc::rc::Rc;
use alloc::vec::Vec;
use alloc::{format, vec};

use crate::aggregation::{self, AggregationModel};
use crate::change::{Change, ChangeKind, ChangedPath, Stages};
use crate::data::RowData;
use crate::error::{InvariantViolation, Result, RowModelError, Warning, Warnings};
use crate::events::{ListenerId, Listeners, ModelEvent, ModelUpdated};
use crate::filter::{self, FilterModel};
use crate::flatten;
use crate::grouping;
use crate::node::RowNode;
use crate::node_manager::{NodeManager, RowTransaction, TransactionResult};
use crate::options::RowModelOptions;
use crate::sort::{self, SortModel};
use crate::tree::{Node, Tree};
use crate::types::{NodeFlags, NodeId, RowBounds, RowId};
use crate::value::Value;

/// Lifecycle of a [`RowModel`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelState {
    /// No row data has been supplied yet.
    Empty,
    /// Row data is loaded; every mutation re-runs part of the pipeline.
    Populated,
}

/// Work done by the most recent pipeline run.
///
/// Counts are the number of nodes (or sibling arrays, for sorting) each stage
/// visited; stages that did not run report zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// The change that triggered the run.
    pub kind: Option<ChangeKind>,
    /// Stages that ran.
    pub stages: Stages,
    /// Leaves placed by grouping.
    pub grouped: usize,
    /// Nodes whose filter state was evaluated.
    pub filtered: usize,
    /// Nodes whose aggregates were recomputed.
    pub aggregated: usize,
    /// Sibling arrays sorted.
    pub sorted: usize,
    /// Rows in the display sequence.
    pub displayed: usize,
}

/// Hierarchical client-side row model.
///
/// ```
/// use understory_row_model::{AggFunc, AggregationModel, MapRow, RowModel, RowModelOptions, Value};
///
/// let mut model = RowModel::with_row_id(
///     RowModelOptions::default().with_group_default_expanded(-1),
///     |r: &MapRow| r.value_str("id").into(),
/// );
/// model.set_group_fields(["country"]);
/// model.set_aggregation_model(AggregationModel::new().with("gold", AggFunc::Sum));
/// model.set_row_data([
///     MapRow::new().with("id", "1").with("country", "Ireland").with("gold", 2).shared(),
///     MapRow::new().with("id", "2").with("country", "Ireland").with("gold", 1).shared(),
/// ]);
///
/// // One group row followed by its two leaves.
/// assert_eq!(model.row_count(), 3);
/// let group = model.row(0).unwrap();
/// assert_eq!(group.aggregate("gold"), Some(&Value::Int(3)));
/// ```
pub struct RowModel<R> {
    options: RowModelOptions,
    tree: Tree<R>,
    nodes: NodeManager<R>,
    group_fields: Vec<Rc<str>>,
    filter: FilterModel,
    sort: SortModel,
    sort_epoch: u64,
    aggregation: AggregationModel,
    /// Display sequence.
    rows: Vec<NodeId>,
    pinned_top: Vec<NodeId>,
    pinned_bottom: Vec<NodeId>,
    state: ModelState,
    warnings: Warnings,
    listeners: Listeners,
    queued: Vec<RowTransaction<R>>,
    last_run: PipelineStats,
    /// Top-level records of the last run that passed verification.
    last_good: Vec<Rc<R>>,
    recovering: bool,
}

impl<R> core::fmt::Debug for RowModel<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RowModel")
            .field("state", &self.state)
            .field("options", &self.options)
            .field("tree", &self.tree)
            .field("group_fields", &self.group_fields)
            .field("rows", &self.rows.len())
            .field("queued", &self.queued.len())
            .field("last_run", &self.last_run)
            .finish_non_exhaustive()
    }
}

impl<R: RowData> RowModel<R> {
    /// Create a model that reconciles rows by record identity.
    pub fn new(options: RowModelOptions) -> Self {
        Self::build(options, NodeManager::new(None))
    }

    /// Create a model that reconciles rows by the id `row_id` derives from each record.
    pub fn with_row_id(options: RowModelOptions, row_id: impl Fn(&R) -> RowId + 'static) -> Self {
        Self::build(options, NodeManager::new(Some(Rc::new(row_id))))
    }

    fn build(options: RowModelOptions, nodes: NodeManager<R>) -> Self {
        Self {
            options,
            tree: Tree::new(),
            nodes,
            group_fields: Vec::new(),
            filter: FilterModel::new(),
            sort: SortModel::new(),
            sort_epoch: 0,
            aggregation: AggregationModel::new(),
            rows: Vec::new(),
            pinned_top: Vec::new(),
            pinned_bottom: Vec::new(),
            state: ModelState::Empty,
            warnings: Warnings::default(),
            listeners: Listeners::default(),
            queued: Vec::new(),
            last_run: PipelineStats::default(),
            last_good: Vec::new(),
            recovering: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Active options.
    pub fn options(&self) -> &RowModelOptions {
        &self.options
    }

    /// Statistics of the most recent pipeline run.
    pub fn last_run(&self) -> &PipelineStats {
        &self.last_run
    }

    // --- Data -----------------------------------------------------------------

    /// Replace all row data.
    ///
    /// Rows are matched to existing nodes by id (or by record identity without a
    /// row-id function), so expansion and selection survive the reload.
    pub fn set_row_data(&mut self, records: impl IntoIterator<Item = Rc<R>>) {
        let records: Vec<Rc<R>> = records.into_iter().collect();
        let removed =
            self.nodes
                .set_row_data(&mut self.tree, &records, &self.options, &mut self.warnings);
        self.state = ModelState::Populated;
        self.report_removed(removed);
        self.run(Change::FullReplace, 0);
    }

    /// Apply one transaction and re-run the pipeline over the rows it touched.
    ///
    /// Transactions queued with [`RowModel::queue_transaction`] are applied first.
    pub fn apply_transaction(&mut self, tx: RowTransaction<R>) -> TransactionResult {
        self.queued.push(tx);
        self.flush_transactions().pop().unwrap_or_default()
    }

    /// Queue a transaction; nothing changes until [`RowModel::flush_transactions`].
    pub fn queue_transaction(&mut self, tx: RowTransaction<R>) {
        self.queued.push(tx);
    }

    /// Stages the next flush will run.
    pub fn pending_stages(&self) -> Stages {
        if self.queued.is_empty() {
            Stages::empty()
        } else {
            ChangeKind::Transaction.stages()
        }
    }

    /// Apply every queued transaction and run the pipeline once over the union
    /// of their changed paths.
    pub fn flush_transactions(&mut self) -> Vec<TransactionResult> {
        if self.queued.is_empty() {
            return Vec::new();
        }
        let queued = core::mem::take(&mut self.queued);
        let _span = tracing::debug_span!("flush", transactions = queued.len()).entered();
        let mut path = ChangedPath::new();
        let mut results = Vec::with_capacity(queued.len());
        let mut removed_selected = Vec::new();
        let mut grouped = 0;
        for tx in queued {
            let applied = self
                .nodes
                .apply(&mut self.tree, tx, &self.options, &mut self.warnings);
            path.merge(applied.path);
            if !self.options.tree_data {
                let mut moved = ChangedPath::new();
                grouped += grouping::run_incremental(
                    &mut self.tree,
                    &self.group_fields,
                    &applied.delta,
                    &mut moved,
                    &self.options,
                    &mut self.warnings,
                );
                path.merge(moved);
            }
            removed_selected.extend(applied.removed_selected);
            results.push(applied.result);
        }
        self.state = ModelState::Populated;
        self.report_removed(removed_selected);
        self.run(Change::Transaction(path), grouped);
        results
    }

    // --- Models ---------------------------------------------------------------

    /// Replace the sort model.
    ///
    /// A field listed more than once is reported as a configuration error and
    /// only its first key is kept.
    pub fn set_sort_model(&mut self, mut model: SortModel) {
        for field in model.dedup_keys() {
            self.warnings.push(Warning::InvalidConfig(format!(
                "sort field `{field}` is listed more than once; keeping the first key"
            )));
        }
        self.sort = model;
        self.sort_epoch += 1;
        self.warnings.forget_reported();
        self.refresh(Change::SortModelChanged);
    }

    /// Active sort model.
    pub fn sort_model(&self) -> &SortModel {
        &self.sort
    }

    /// Replace the filter model.
    pub fn set_filter_model(&mut self, model: FilterModel) {
        self.filter = model;
        self.warnings.forget_reported();
        self.refresh(Change::FilterModelChanged);
    }

    /// Active filter model.
    pub fn filter_model(&self) -> &FilterModel {
        &self.filter
    }

    /// True if any filter predicate is active.
    pub fn is_any_filter_present(&self) -> bool {
        !self.filter.is_empty()
    }

    /// Replace the grouping fields. Ignored with a warning in tree-data mode.
    pub fn set_group_fields<S: AsRef<str>>(&mut self, fields: impl IntoIterator<Item = S>) {
        let fields: Vec<Rc<str>> = fields.into_iter().map(|f| Rc::from(f.as_ref())).collect();
        if self.options.tree_data && !fields.is_empty() {
            self.warnings.push(Warning::InvalidConfig(format!(
                "grouping by {} field(s) is ignored while tree data is enabled",
                fields.len()
            )));
            return;
        }
        if fields == self.group_fields {
            return;
        }
        self.group_fields = fields;
        self.warnings.forget_reported();
        self.refresh(Change::GroupModelChanged);
    }

    /// Active grouping fields.
    pub fn group_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.group_fields.iter().map(|f| &**f)
    }

    /// Replace the aggregation model.
    pub fn set_aggregation_model(&mut self, model: AggregationModel) {
        self.aggregation = model;
        self.warnings.forget_reported();
        self.refresh(Change::AggregationConfigChanged);
    }

    /// Active aggregation model.
    pub fn aggregation_model(&self) -> &AggregationModel {
        &self.aggregation
    }

    /// Toggle aggregation at the synthetic root.
    pub fn set_aggregate_root(&mut self, enabled: bool) {
        if self.options.aggregate_root != enabled {
            self.options.aggregate_root = enabled;
            self.refresh(Change::AggregationConfigChanged);
        }
    }

    /// Toggle aggregation over all children instead of the filtered ones.
    pub fn set_suppress_agg_filtered_only(&mut self, suppress: bool) {
        if self.options.suppress_agg_filtered_only != suppress {
            self.options.suppress_agg_filtered_only = suppress;
            self.refresh(Change::AggregationConfigChanged);
        }
    }

    // --- Expansion and selection ----------------------------------------------

    /// Expand or collapse a group, optionally with every group below it.
    pub fn set_expanded(&mut self, id: &str, expanded: bool, recursive: bool) -> Result<()> {
        let n = self.lookup(id)?;
        if !self.tree.node(n).is_group() {
            return Err(RowModelError::NotAGroup(RowId::new(id)));
        }
        let mut targets = vec![n];
        if recursive {
            let groups = self.tree.descendants(n);
            targets.extend(groups.into_iter().filter(|&d| self.tree.node(d).is_group()));
        }
        for t in targets {
            self.tree.node_mut(t).flags.set(NodeFlags::EXPANDED, expanded);
        }
        self.refresh(Change::ExpansionChanged);
        Ok(())
    }

    /// Expand every group.
    pub fn expand_all(&mut self) {
        self.set_all_expanded(true);
    }

    /// Collapse every group.
    pub fn collapse_all(&mut self) {
        self.set_all_expanded(false);
    }

    fn set_all_expanded(&mut self, expanded: bool) {
        let root = self.tree.root();
        for id in self.tree.descendants(root) {
            let node = self.tree.node_mut(id);
            if node.is_group() {
                node.flags.set(NodeFlags::EXPANDED, expanded);
            }
        }
        self.refresh(Change::ExpansionChanged);
    }

    /// Select or deselect a row. Selection does not affect the pipeline.
    pub fn set_selected(&mut self, id: &str, selected: bool) -> Result<()> {
        let n = self.lookup(id)?;
        self.tree.node_mut(n).flags.set(NodeFlags::SELECTED, selected);
        Ok(())
    }

    /// Selected rows in tree order.
    pub fn selected_nodes(&self) -> Vec<RowNode<'_, R>> {
        let mut out = Vec::new();
        self.for_each_node(|n| {
            if n.selected() {
                out.push(n);
            }
        });
        out
    }

    fn lookup(&self, id: &str) -> Result<NodeId> {
        self.tree
            .lookup(id)
            .ok_or_else(|| RowModelError::UnknownRow(RowId::new(id)))
    }

    // --- Queries --------------------------------------------------------------

    /// Number of displayed rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Row at `display_index`.
    pub fn row(&self, display_index: usize) -> Option<RowNode<'_, R>> {
        let id = *self.rows.get(display_index)?;
        RowNode::new(&self.tree, id)
    }

    /// Displayed rows in order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = RowNode<'_, R>> + '_ {
        self.rows.iter().map(|&id| RowNode::new(&self.tree, id).expect("dangling NodeId"))
    }

    /// Row (group or leaf) with the given id.
    pub fn row_node(&self, id: &str) -> Option<RowNode<'_, R>> {
        RowNode::new(&self.tree, self.tree.lookup(id)?)
    }

    /// View of a node by handle; `None` once the node is gone.
    pub fn node(&self, id: NodeId) -> Option<RowNode<'_, R>> {
        RowNode::new(&self.tree, id)
    }

    /// Returns true if `id` refers to a live row.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Structural top-level rows, in input order.
    pub fn top_level_nodes(&self) -> Vec<RowNode<'_, R>> {
        let root = self.tree.root();
        self.tree
            .node(root)
            .children
            .iter()
            .filter_map(|&id| RowNode::new(&self.tree, id))
            .collect()
    }

    /// True when there are no body rows.
    pub fn is_empty(&self) -> bool {
        self.tree.node(self.tree.root()).children.is_empty()
    }

    /// True when at least one row is displayed.
    pub fn is_rows_to_render(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Aggregate at the synthetic root; needs [`RowModelOptions::aggregate_root`].
    pub fn root_aggregate(&self, field: &str) -> Option<&Value> {
        self.tree
            .node(self.tree.root())
            .aggregates
            .as_ref()?
            .iter()
            .find(|c| &*c.field == field)
            .map(|c| &c.value)
    }

    /// Visit every row (groups and leaves) in tree order, ignoring filter and sort.
    pub fn for_each_node<'s>(&'s self, f: impl FnMut(RowNode<'s, R>)) {
        self.walk(|n| n.children.as_slice(), f);
    }

    /// Visit every leaf.
    ///
    /// Flat input is visited in input order, tree data in tree order.
    pub fn for_each_leaf_node<'s>(&'s self, mut f: impl FnMut(RowNode<'s, R>)) {
        if self.options.tree_data {
            self.walk(|n| n.children.as_slice(), |n| {
                if n.is_leaf() {
                    f(n);
                }
            });
        } else {
            for &id in self.nodes.leaves() {
                if let Some(n) = RowNode::new(&self.tree, id) {
                    f(n);
                }
            }
        }
    }

    /// Visit every row that passed the filter, in tree order.
    pub fn for_each_node_after_filter<'s>(&'s self, f: impl FnMut(RowNode<'s, R>)) {
        self.walk(|n| n.children_after_filter.as_slice(), f);
    }

    /// Visit every row that passed the filter, in sorted order, including collapsed rows.
    pub fn for_each_node_after_filter_and_sort<'s>(&'s self, f: impl FnMut(RowNode<'s, R>)) {
        self.walk(|n| n.children_after_sort.as_slice(), f);
    }

    fn walk<'s>(
        &'s self,
        children: impl Fn(&'s Node<R>) -> &'s [NodeId],
        mut f: impl FnMut(RowNode<'s, R>),
    ) {
        let root = self.tree.root();
        let mut stack: Vec<NodeId> = children(self.tree.node(root)).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.tree.get(id) else {
                continue;
            };
            stack.extend(children(node).iter().rev().copied());
            if let Some(view) = RowNode::new(&self.tree, id) {
                f(view);
            }
        }
    }

    // --- Pinned rows ----------------------------------------------------------

    /// Replace the rows pinned above the body.
    pub fn set_pinned_top_rows(&mut self, records: impl IntoIterator<Item = Rc<R>>) {
        let old = core::mem::take(&mut self.pinned_top);
        self.pinned_top = self.replace_pinned(old, records, NodeFlags::PINNED_TOP, "t");
    }

    /// Replace the rows pinned below the body.
    pub fn set_pinned_bottom_rows(&mut self, records: impl IntoIterator<Item = Rc<R>>) {
        let old = core::mem::take(&mut self.pinned_bottom);
        self.pinned_bottom = self.replace_pinned(old, records, NodeFlags::PINNED_BOTTOM, "b");
    }

    fn replace_pinned(
        &mut self,
        old: Vec<NodeId>,
        records: impl IntoIterator<Item = Rc<R>>,
        flag: NodeFlags,
        prefix: &str,
    ) -> Vec<NodeId> {
        for id in old {
            self.tree.discard(id);
        }
        let rows: Vec<NodeId> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                let id = RowId::from(format!("{prefix}-{i}"));
                self.nodes.create_detached(&mut self.tree, record, id, flag)
            })
            .collect();
        flatten::index_pinned(&mut self.tree, &rows);
        rows
    }

    /// Pinned top row at `index`.
    pub fn pinned_top_row(&self, index: usize) -> Option<RowNode<'_, R>> {
        RowNode::new(&self.tree, *self.pinned_top.get(index)?)
    }

    /// Pinned bottom row at `index`.
    pub fn pinned_bottom_row(&self, index: usize) -> Option<RowNode<'_, R>> {
        RowNode::new(&self.tree, *self.pinned_bottom.get(index)?)
    }

    /// Number of pinned top rows.
    pub fn pinned_top_row_count(&self) -> usize {
        self.pinned_top.len()
    }

    /// Number of pinned bottom rows.
    pub fn pinned_bottom_row_count(&self) -> usize {
        self.pinned_bottom.len()
    }

    // --- Bounds ---------------------------------------------------------------

    /// Vertical extent of the displayed row at `display_index`.
    #[allow(
        clippy::cast_precision_loss,
        reason = "Row counts stay far below 2^52."
    )]
    pub fn row_bounds(&self, display_index: usize) -> Option<RowBounds> {
        (display_index < self.rows.len()).then(|| RowBounds {
            top: display_index as f64 * self.options.row_height,
            height: self.options.row_height,
        })
    }

    /// Display index of the row covering vertical offset `pixel`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "The offset is checked to be non-negative and inside the body."
    )]
    pub fn row_index_at_pixel(&self, pixel: f64) -> Option<usize> {
        let height = self.options.row_height;
        if !(pixel >= 0.0 && pixel < self.total_height() && height > 0.0) {
            return None;
        }
        Some(((pixel / height) as usize).min(self.rows.len() - 1))
    }

    /// Height of all displayed rows.
    #[allow(
        clippy::cast_precision_loss,
        reason = "Row counts stay far below 2^52."
    )]
    pub fn total_height(&self) -> f64 {
        self.rows.len() as f64 * self.options.row_height
    }

    // --- Notifications and warnings -------------------------------------------

    /// Register a listener for [`ModelEvent`]s.
    pub fn add_event_listener(&mut self, listener: impl FnMut(&ModelEvent) + 'static) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Remove a listener; returns false if it was not registered.
    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Warnings buffered since the last call to [`RowModel::take_warnings`].
    pub fn warnings(&self) -> &[Warning] {
        self.warnings.as_slice()
    }

    /// Drain the warning buffer.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        self.warnings.take()
    }

    fn report_removed(&mut self, removed: Vec<RowId>) {
        if !removed.is_empty() {
            self.listeners.emit(&ModelEvent::SelectedRowsRemoved(removed));
        }
    }

    // --- Pipeline -------------------------------------------------------------

    /// Verify the tree's structural invariants against the current display sequence.
    pub fn check_invariants(&self) -> core::result::Result<(), InvariantViolation> {
        self.tree
            .check_invariants(&self.rows, !self.aggregation.is_empty())
    }

    fn refresh(&mut self, change: Change) {
        if self.state == ModelState::Populated {
            self.run(change, 0);
        }
    }

    #[tracing::instrument(skip_all, fields(kind = ?change.kind()))]
    fn run(&mut self, change: Change, grouped: usize) {
        let kind = change.kind();
        let stages = kind.stages();
        let path = change.changed_path();
        let mut stats = PipelineStats {
            kind: Some(kind),
            stages,
            grouped,
            ..PipelineStats::default()
        };
        if stages.contains(Stages::GROUP) && path.is_none() && !self.options.tree_data {
            stats.grouped = grouping::run_full(
                &mut self.tree,
                &self.group_fields,
                self.nodes.leaves(),
                &self.options,
                &mut self.warnings,
            );
        }
        if stages.contains(Stages::FILTER) {
            stats.filtered = filter::run(&mut self.tree, &self.filter, path, &mut self.warnings);
        }
        if stages.contains(Stages::AGGREGATE) {
            stats.aggregated = aggregation::run(
                &mut self.tree,
                &self.aggregation,
                &self.options,
                path,
                &mut self.warnings,
            );
        }
        if stages.contains(Stages::SORT) {
            stats.sorted = sort::run(
                &mut self.tree,
                &self.sort,
                self.sort_epoch,
                path,
                &mut self.warnings,
            );
        }
        if stages.contains(Stages::FLATTEN) {
            let rows = flatten::run(&mut self.tree, &self.rows);
            self.rows = rows;
        }
        stats.displayed = self.rows.len();
        tracing::debug!(?stats, "pipeline complete");
        self.last_run = stats;
        self.verify();

        self.listeners.emit(&ModelEvent::ModelUpdated(ModelUpdated {
            animate: self.options.animate_rows,
            new_data: kind == ChangeKind::FullReplace,
            keep_rendered_rows: kind != ChangeKind::FullReplace,
        }));
        if kind == ChangeKind::FullReplace {
            self.listeners.emit(&ModelEvent::RowCountReady);
        }
    }

    fn verify(&mut self) {
        if !self.options.verifies_invariants() {
            return;
        }
        match self.check_invariants() {
            Ok(()) => self.last_good = self.nodes.records(&self.tree, &self.options),
            Err(violation) => {
                if cfg!(debug_assertions) && !self.recovering {
                    panic!("row model invariant violated: {violation}");
                }
                self.recover(violation);
            }
        }
    }

    /// Rebuild from the last verified input after an invariant violation.
    fn recover(&mut self, violation: InvariantViolation) {
        tracing::error!(%violation, "rebuilding row model");
        self.warnings.push(Warning::Recovered(violation));
        if self.recovering {
            return;
        }
        self.recovering = true;
        let records = core::mem::take(&mut self.last_good);
        let pinned_top = self.pinned_records(&self.pinned_top);
        let pinned_bottom = self.pinned_records(&self.pinned_bottom);
        self.tree = Tree::new();
        self.nodes.reset();
        self.rows.clear();
        self.pinned_top.clear();
        self.pinned_bottom.clear();
        self.set_row_data(records);
        self.set_pinned_top_rows(pinned_top);
        self.set_pinned_bottom_rows(pinned_bottom);
        self.recovering = false;
    }

    fn pinned_records(&self, rows: &[NodeId]) -> Vec<Rc<R>> {
        rows.iter()
            .filter_map(|&id| self.tree.get(id).and_then(|n| n.data.clone()))
            .collect()
    }
}
