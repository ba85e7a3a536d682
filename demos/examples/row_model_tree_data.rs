// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Nested input, transactions and change events.
//!
//! Run:
//! - `cargo run -p understory_row_model_demos --example row_model_tree_data`

use std::rc::Rc;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use understory_row_model::{
    AggFunc, AggregationModel, MapRow, ModelEvent, RowModel, RowModelOptions, RowTransaction,
};

fn file(id: &str, size: i64) -> Rc<MapRow> {
    MapRow::new().with("id", id).with("size", size).shared()
}

fn folder(id: &str, children: impl IntoIterator<Item = Rc<MapRow>>) -> Rc<MapRow> {
    MapRow::new().with("id", id).with_children(children).shared()
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Options are plain serde data and can come from a config file.
    let options: RowModelOptions = serde_json::from_str(
        r#"{ "tree_data": true, "group_default_expanded": -1, "aggregate_root": true }"#,
    )
    .expect("valid options");

    let mut model = RowModel::with_row_id(options, |r: &MapRow| r.value_str("id").into());
    model.set_aggregation_model(AggregationModel::new().with("size", AggFunc::Sum));
    model.add_event_listener(|event| match event {
        ModelEvent::ModelUpdated(update) => tracing::info!(?update, "model updated"),
        ModelEvent::RowCountReady => tracing::info!("row count ready"),
        ModelEvent::SelectedRowsRemoved(ids) => tracing::info!(?ids, "selected rows removed"),
    });

    model.set_row_data([
        folder("docs", [file("docs/a.md", 12), file("docs/b.md", 30)]),
        folder("src", [folder("src/bin", [file("src/bin/main.rs", 4)]), file("src/lib.rs", 40)]),
    ]);
    print_tree(&model);

    model.set_selected("docs/b.md", true).expect("row exists");
    let result = model.apply_transaction(
        RowTransaction::new()
            .remove("docs/b.md")
            .add(file("src/bin/tool.rs", 9))
            .under("src/bin"),
    );
    println!("transaction: {result:?}");
    println!("stages re-run: {:?}", model.last_run());
    print_tree(&model);
}

fn print_tree(model: &RowModel<MapRow>) {
    println!("total size: {:?}", model.root_aggregate("size"));
    for row in model.rows() {
        let indent = "  ".repeat(row.level() as usize);
        let size = match row.aggregate("size") {
            Some(sum) => sum.key_string(),
            None => row.data().map(|d| d.value_str("size")).unwrap_or_default(),
        };
        println!("{indent}{}  {size}", row.id());
    }
}
