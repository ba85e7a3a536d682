// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::rc::Rc;

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_row_model::{
    AggFunc, AggregationModel, MapRow, RowModel, RowModelOptions, RowTransaction, SortKey,
    SortModel,
};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn below(&mut self, n: u64) -> i64 {
        (self.next_u64() % n) as i64
    }
}

fn gen_rows(count: usize, seed: u64) -> Vec<Rc<MapRow>> {
    let mut rng = Rng::new(seed);
    (0..count)
        .map(|i| {
            MapRow::new()
                .with("id", format!("r{i}"))
                .with("country", format!("C{}", rng.below(20)))
                .with("year", 2000 + rng.below(10))
                .with("gold", rng.below(5))
                .shared()
        })
        .collect()
}

fn grouped_model(rows: &[Rc<MapRow>]) -> RowModel<MapRow> {
    let mut model = RowModel::with_row_id(
        RowModelOptions::default().with_group_default_expanded(-1),
        |r: &MapRow| r.value_str("id").into(),
    );
    model.set_group_fields(["country", "year"]);
    model.set_aggregation_model(AggregationModel::new().with("gold", AggFunc::Sum));
    model.set_sort_model(SortModel::new().with(SortKey::desc("gold")));
    model.set_row_data(rows.iter().cloned());
    model
}

fn bench_full_replace(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_replace");
    for &n in &[1_000_usize, 10_000] {
        let rows = gen_rows(n, 0xC0FFEE);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("grouped_{n}"), |b| {
            b.iter_batched(
                || grouped_model(&rows),
                |mut model| {
                    model.set_row_data(rows.iter().rev().cloned());
                    black_box(model.row_count())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_transactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction");
    for &n in &[1_000_usize, 10_000] {
        let rows = gen_rows(n, 0xBEEF);
        group.bench_function(format!("update_one_of_{n}"), |b| {
            b.iter_batched(
                || grouped_model(&rows),
                |mut model| {
                    let row = MapRow::new()
                        .with("id", "r0")
                        .with("country", "C0")
                        .with("year", 2000)
                        .with("gold", 99)
                        .shared();
                    model.apply_transaction(RowTransaction::new().update(row));
                    black_box(model.last_run().aggregated)
                },
                BatchSize::LargeInput,
            );
        });
        group.bench_function(format!("add_remove_of_{n}"), |b| {
            b.iter_batched(
                || grouped_model(&rows),
                |mut model| {
                    let extra = MapRow::new()
                        .with("id", "extra")
                        .with("country", "C1")
                        .with("year", 2001)
                        .with("gold", 3)
                        .shared();
                    model.apply_transaction(RowTransaction::new().add(extra).remove("r1"));
                    black_box(model.row_count())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_sort_and_expand(c: &mut Criterion) {
    let rows = gen_rows(10_000, 7);
    let mut model = grouped_model(&rows);
    let mut group = c.benchmark_group("model_change");
    group.bench_function("sort_changed", |b| {
        let mut desc = false;
        b.iter(|| {
            desc = !desc;
            let key = if desc { SortKey::desc("gold") } else { SortKey::asc("gold") };
            model.set_sort_model(SortModel::new().with(key));
            black_box(model.row_count())
        });
    });
    group.bench_function("collapse_expand", |b| {
        let mut expanded = false;
        b.iter(|| {
            expanded = !expanded;
            if expanded {
                model.expand_all();
            } else {
                model.collapse_all();
            }
            black_box(model.row_count())
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_full_replace,
    bench_transactions,
    bench_sort_and_expand
);
criterion_main!(benches);
