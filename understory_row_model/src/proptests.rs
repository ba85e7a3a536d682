// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property tests over whole pipeline runs.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use proptest::prelude::*;

use crate::{
    AggFunc, AggregationModel, FilterModel, FilterState, MapRow, Predicate, RowData, RowModel,
    RowModelOptions, RowTransaction, SortKey, SortModel, Value,
};

fn model(expanded: i32) -> RowModel<MapRow> {
    let mut model = RowModel::with_row_id(
        RowModelOptions::default().with_group_default_expanded(expanded),
        |r: &MapRow| r.value_str("id").into(),
    );
    model.set_group_fields(["g"]);
    model.set_aggregation_model(AggregationModel::new().with("v", AggFunc::Sum));
    model
}

fn row(id: &str, g: u8, v: i64) -> Rc<MapRow> {
    MapRow::new()
        .with("id", id)
        .with("g", format!("G{g}"))
        .with("v", v)
        .shared()
}

fn rows(input: &[(u8, i64)]) -> Vec<Rc<MapRow>> {
    input.iter()
        .enumerate()
        .map(|(i, &(g, v))| row(&format!("r{i}"), g, v))
        .collect()
}

fn int(v: Option<Value>) -> i64 {
    match v {
        Some(Value::Int(i)) => i,
        _ => 0,
    }
}

/// Every group's sum must match a recomputation over its filtered children.
fn sums_are_exact(model: &RowModel<MapRow>) -> Result<(), TestCaseError> {
    let mut result = Ok(());
    model.for_each_node(|n| {
        if !n.is_group() || result.is_err() {
            return;
        }
        let expected: i64 = n
            .children_after_filter()
            .map(|c| {
                if c.is_group() {
                    int(c.aggregate("v").cloned())
                } else {
                    int(c.data().and_then(|d| d.value("v")))
                }
            })
            .sum();
        if n.children_after_filter().len() > 0 && int(n.aggregate("v").cloned()) != expected {
            result = Err(TestCaseError::fail(format!(
                "group {} sums to {:?}, expected {expected}",
                n.id(),
                n.aggregate("v")
            )));
        }
    });
    result
}

#[derive(Clone, Debug)]
enum Op {
    Add(u8, i64),
    Remove(usize),
    Update(usize, u8, i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, -50i64..50).prop_map(|(g, v)| Op::Add(g, v)),
        (0usize..64).prop_map(Op::Remove),
        (0usize..64, 0u8..4, -50i64..50).prop_map(|(i, g, v)| Op::Update(i, g, v)),
    ]
}

/// Model with aggregation and a sort that orders every sibling array fully.
fn sorted_model(options: RowModelOptions, fields: &[&str]) -> RowModel<MapRow> {
    let mut model = RowModel::with_row_id(options.with_group_default_expanded(-1), |r: &MapRow| {
        r.value_str("id").into()
    });
    if !fields.is_empty() {
        model.set_group_fields(fields.iter());
    }
    model.set_aggregation_model(AggregationModel::new().with("v", AggFunc::Sum));
    model.set_sort_model(
        SortModel::new()
            .with(SortKey::desc("v"))
            .with(SortKey::asc("id"))
            .with_group_order(|a, b| Ok(a.compare(b))),
    );
    model
}

/// Displayed rows as `(id, level, sum of v)`.
fn snapshot(model: &RowModel<MapRow>) -> Vec<(String, u32, Option<Value>)> {
    model
        .rows()
        .map(|r| (String::from(r.id().as_str()), r.level(), r.aggregate("v").cloned()))
        .collect()
}

#[derive(Clone, Debug)]
struct Leveled {
    id: String,
    g: u8,
    h: u8,
    v: i64,
}

impl Leveled {
    fn record(&self) -> Rc<MapRow> {
        MapRow::new()
            .with("id", self.id.as_str())
            .with("g", format!("G{}", self.g))
            .with("h", format!("H{}", self.h))
            .with("v", self.v)
            .shared()
    }
}

#[derive(Clone, Debug)]
enum FlatOp {
    Add(u8, u8, i64),
    Remove(usize),
    Update(usize, u8, u8, i64),
}

fn flat_op() -> impl Strategy<Value = FlatOp> {
    prop_oneof![
        (0u8..3, 0u8..3, -20i64..20).prop_map(|(g, h, v)| FlatOp::Add(g, h, v)),
        (0usize..64).prop_map(FlatOp::Remove),
        (0usize..64, 0u8..3, 0u8..3, -20i64..20)
            .prop_map(|(i, g, h, v)| FlatOp::Update(i, g, h, v)),
    ]
}

#[derive(Clone, Debug)]
struct Nested {
    id: String,
    v: i64,
    parent: Option<String>,
}

/// Rebuild nested records under `parent` in insertion order.
fn nest(rows: &[Nested], parent: Option<&str>) -> Vec<Rc<MapRow>> {
    rows.iter()
        .filter(|r| r.parent.as_deref() == parent)
        .map(|r| {
            MapRow::new()
                .with("id", r.id.as_str())
                .with("v", r.v)
                .with_children(nest(rows, Some(&r.id)))
                .shared()
        })
        .collect()
}

#[derive(Clone, Debug)]
enum TreeOp {
    Add(i64, Option<usize>),
    Remove(usize),
    Update(usize, i64),
}

fn tree_op() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        (-20i64..20, prop::option::of(0usize..64)).prop_map(|(v, p)| TreeOp::Add(v, p)),
        (0usize..64).prop_map(TreeOp::Remove),
        (0usize..64, -20i64..20).prop_map(|(i, v)| TreeOp::Update(i, v)),
    ]
}

proptest! {
    #[test]
    fn display_indices_are_dense(
        input in prop::collection::vec((0u8..4, -50i64..50), 0..40),
        expanded in prop_oneof![Just(0), Just(1), Just(-1)],
        collapse in prop::collection::vec(0u8..4, 0..3),
    ) {
        let mut model = model(expanded);
        model.set_row_data(rows(&input));
        for g in collapse {
            let _ = model.set_expanded(&format!("row-group-g-G{g}"), false, false);
        }
        prop_assert!(model.check_invariants().is_ok());
        for (i, r) in model.rows().enumerate() {
            prop_assert_eq!(r.display_index(), Some(i));
        }
        let mut shown = 0;
        model.for_each_node(|n| shown += usize::from(n.display_index().is_some()));
        prop_assert_eq!(shown, model.row_count());
    }

    #[test]
    fn parent_child_links_are_symmetric(
        input in prop::collection::vec((0u8..4, -50i64..50), 0..40),
    ) {
        let mut model = model(-1);
        model.set_row_data(rows(&input));
        let mut ok = true;
        model.for_each_node(|n| {
            for c in n.children() {
                ok &= c.parent() == Some(n) && c.level() == n.level() + 1;
            }
        });
        prop_assert!(ok);
        let top = model.top_level_nodes();
        prop_assert!(top.iter().all(|n| n.parent().is_none() && n.level() == 0));
    }

    #[test]
    fn group_sums_survive_transactions(
        input in prop::collection::vec((0u8..4, -50i64..50), 1..20),
        ops in prop::collection::vec(op(), 1..20),
    ) {
        let mut model = model(-1);
        model.set_row_data(rows(&input));
        let mut live: Vec<String> = (0..input.len()).map(|i| format!("r{i}")).collect();
        let mut next = input.len();
        for op in ops {
            let tx = match op {
                Op::Add(g, v) => {
                    let id = format!("r{next}");
                    next += 1;
                    live.push(id.clone());
                    RowTransaction::new().add(row(&id, g, v))
                }
                Op::Remove(i) if !live.is_empty() => {
                    let id = live.remove(i % live.len());
                    RowTransaction::new().remove(id.as_str())
                }
                Op::Update(i, g, v) if !live.is_empty() => {
                    RowTransaction::new().update(row(&live[i % live.len()], g, v))
                }
                _ => continue,
            };
            model.apply_transaction(tx);
            prop_assert!(model.check_invariants().is_ok());
            sums_are_exact(&model)?;
            let mut leaves = 0;
            model.for_each_leaf_node(|_| leaves += 1);
            prop_assert_eq!(leaves, live.len());
        }
        prop_assert!(model.take_warnings().is_empty());
    }

    #[test]
    fn reordered_input_keeps_nodes_and_sorted_order(
        (input, order) in prop::collection::vec((0u8..4, -50i64..50), 1..30)
            .prop_flat_map(|input| {
                let idx: Vec<usize> = (0..input.len()).collect();
                (Just(input), Just(idx).prop_shuffle())
            }),
    ) {
        let mut model = model(-1);
        model.set_sort_model(
            SortModel::new()
                .with(SortKey::asc("v"))
                .with(SortKey::asc("id"))
                .with_group_order(|a, b| Ok(a.compare(b))),
        );
        let records = rows(&input);
        model.set_row_data(records.iter().cloned());
        let before: Vec<_> = model.rows().map(|r| r.node_id()).collect();

        model.set_row_data(order.iter().map(|&i| records[i].clone()));
        let after: Vec<_> = model.rows().map(|r| r.node_id()).collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn sort_is_stable(
        input in prop::collection::vec((0u8..2, -3i64..3), 0..30),
    ) {
        let mut model = model(-1);
        model.set_group_fields(core::iter::empty::<&str>());
        model.set_row_data(rows(&input));
        model.set_sort_model(SortModel::new().with(SortKey::desc("v")));
        let got: Vec<(i64, usize)> = model
            .rows()
            .map(|r| (int(r.data().and_then(|d| d.value("v"))), r.source_index()))
            .collect();
        for pair in got.windows(2) {
            let ((va, ia), (vb, ib)) = (pair[0], pair[1]);
            prop_assert!(va > vb || (va == vb && ia < ib), "{:?}", got);
        }
    }

    #[test]
    fn groups_are_visible_iff_a_leaf_passes(
        input in prop::collection::vec((0u8..4, -50i64..50), 0..40),
        threshold in -50i64..50,
    ) {
        let mut model = model(-1);
        model.set_row_data(rows(&input));
        model.set_filter_model(
            FilterModel::new().with("v", Predicate::GreaterThan(Value::Int(threshold))),
        );
        let mut ok = true;
        model.for_each_node(|n| {
            if n.is_group() {
                let any_leaf = n.children().any(|c| c.filter_state() == FilterState::Pass);
                ok &= any_leaf == n.filter_state().is_visible();
                ok &= any_leaf == n.display_index().is_some();
            }
        });
        prop_assert!(ok);
        sums_are_exact(&model)?;
    }

    #[test]
    fn grouped_transactions_match_a_fresh_load(
        input in prop::collection::vec((0u8..3, 0u8..3, -20i64..20), 1..20),
        ops in prop::collection::vec(flat_op(), 1..16),
    ) {
        let fields = ["g", "h"];
        let mut live: Vec<Leveled> = input
            .iter()
            .enumerate()
            .map(|(i, &(g, h, v))| Leveled { id: format!("r{i}"), g, h, v })
            .collect();
        let mut model = sorted_model(RowModelOptions::default(), &fields);
        model.set_row_data(live.iter().map(Leveled::record));
        let mut next = live.len();
        for op in ops {
            let tx = match op {
                FlatOp::Add(g, h, v) => {
                    let row = Leveled { id: format!("r{next}"), g, h, v };
                    next += 1;
                    let tx = RowTransaction::new().add(row.record());
                    live.push(row);
                    tx
                }
                FlatOp::Remove(i) if !live.is_empty() => {
                    let row = live.remove(i % live.len());
                    RowTransaction::new().remove(row.id.as_str())
                }
                FlatOp::Update(i, g, h, v) if !live.is_empty() => {
                    let i = i % live.len();
                    live[i] = Leveled { id: live[i].id.clone(), g, h, v };
                    RowTransaction::new().update(live[i].record())
                }
                _ => continue,
            };
            model.apply_transaction(tx);
            prop_assert!(model.check_invariants().is_ok());

            let mut fresh = sorted_model(RowModelOptions::default(), &fields);
            fresh.set_row_data(live.iter().map(Leveled::record));
            prop_assert_eq!(snapshot(&model), snapshot(&fresh));
        }
        prop_assert!(model.take_warnings().is_empty());
    }

    #[test]
    fn tree_transactions_match_a_fresh_load(
        input in prop::collection::vec((-20i64..20, prop::option::of(0usize..64)), 1..16),
        ops in prop::collection::vec(tree_op(), 1..16),
    ) {
        // Each input row hangs below an earlier one or at the top level.
        let mut live: Vec<Nested> = Vec::new();
        for (i, &(v, parent)) in input.iter().enumerate() {
            let parent = parent.filter(|_| i > 0).map(|p| live[p % i].id.clone());
            live.push(Nested { id: format!("r{i}"), v, parent });
        }
        let mut model = sorted_model(RowModelOptions::tree_data(), &[]);
        model.set_row_data(nest(&live, None));
        let mut next = live.len();
        for op in ops {
            let tx = match op {
                TreeOp::Add(v, parent) => {
                    let parent = parent
                        .filter(|_| !live.is_empty())
                        .map(|p| live[p % live.len()].id.clone());
                    let row = Nested { id: format!("r{next}"), v, parent };
                    next += 1;
                    let record = MapRow::new().with("id", row.id.as_str()).with("v", v).shared();
                    let tx = RowTransaction::new().add(record);
                    let tx = match &row.parent {
                        Some(p) => tx.under(p.as_str()),
                        None => tx,
                    };
                    live.push(row);
                    tx
                }
                TreeOp::Remove(i) if !live.is_empty() => {
                    let id = live[i % live.len()].id.clone();
                    let mut gone = vec![id.clone()];
                    let mut k = 0;
                    while k < gone.len() {
                        let below: Vec<String> = live
                            .iter()
                            .filter(|r| r.parent.as_deref() == Some(gone[k].as_str()))
                            .map(|r| r.id.clone())
                            .collect();
                        gone.extend(below);
                        k += 1;
                    }
                    live.retain(|r| !gone.contains(&r.id));
                    RowTransaction::new().remove(id.as_str())
                }
                TreeOp::Update(i, v) if !live.is_empty() => {
                    let i = i % live.len();
                    live[i].v = v;
                    let record = MapRow::new().with("id", live[i].id.as_str()).with("v", v).shared();
                    RowTransaction::new().update(record)
                }
                _ => continue,
            };
            model.apply_transaction(tx);
            prop_assert!(model.check_invariants().is_ok());

            let mut fresh = sorted_model(RowModelOptions::tree_data(), &[]);
            fresh.set_row_data(nest(&live, None));
            prop_assert_eq!(snapshot(&model), snapshot(&fresh));
        }
        prop_assert!(model.take_warnings().is_empty());
    }
}
