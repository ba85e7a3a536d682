// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grouping, aggregation and filtering over flat records.
//!
//! Run:
//! - `cargo run -p understory_row_model_demos --example row_model_grouping`
//! - `RUST_LOG=understory_row_model=debug cargo run -p understory_row_model_demos --example row_model_grouping`

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use understory_row_model::{
    AggFunc, AggregationModel, FilterModel, MapRow, Predicate, RowModel, RowModelOptions, RowNode,
    SortKey, SortModel, Value,
};

fn print_rows(title: &str, model: &RowModel<MapRow>) {
    println!("== {title} ({} rows)", model.row_count());
    for row in model.rows() {
        println!("{}", describe(row));
    }
}

fn describe(row: RowNode<'_, MapRow>) -> String {
    let indent = "  ".repeat(row.level() as usize);
    if row.is_group() {
        let key = row.group_key().map(Value::key_string).unwrap_or_default();
        let gold = row.aggregate("gold").cloned().unwrap_or_default();
        format!("{indent}[{}] {key}  gold={gold}  ({} athletes)", row.display_index().unwrap_or(0), row.all_leaf_count())
    } else {
        let data = row.data().expect("leaf rows carry data");
        format!(
            "{indent}[{}] {}  gold={}",
            row.display_index().unwrap_or(0),
            data.value_str("athlete"),
            data.value_str("gold")
        )
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let athlete = |id: &str, name: &str, country: &str, year: i64, gold: i64| {
        MapRow::new()
            .with("id", id)
            .with("athlete", name)
            .with("country", country)
            .with("year", year)
            .with("gold", gold)
            .shared()
    };

    let mut model = RowModel::with_row_id(
        RowModelOptions::default().with_group_default_expanded(1),
        |r: &MapRow| r.value_str("id").into(),
    );
    model.set_group_fields(["country", "year"]);
    model.set_aggregation_model(AggregationModel::new().with("gold", AggFunc::Sum));
    model.set_sort_model(SortModel::new().with(SortKey::desc("gold")));
    model.set_row_data([
        athlete("1", "Phelps", "United States", 2008, 8),
        athlete("2", "Coughlin", "United States", 2008, 1),
        athlete("3", "Lochte", "United States", 2012, 2),
        athlete("4", "Thorpe", "Australia", 2004, 2),
        athlete("5", "Rice", "Australia", 2008, 3),
    ]);
    print_rows("grouped by country, year", &model);

    model.set_expanded("row-group-country-Australia-year-2008", true, false).expect("group exists");
    print_rows("Australia 2008 expanded", &model);

    model.set_filter_model(FilterModel::new().with("gold", Predicate::GreaterThanOrEqual(3.into())));
    print_rows("gold >= 3", &model);

    // A field the records do not have is reported once and treated as null.
    model.set_sort_model(SortModel::new().with(SortKey::asc("silver")));
    for warning in model.take_warnings() {
        println!("warning: {warning}");
    }
}
