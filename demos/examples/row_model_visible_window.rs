// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visible-window example using row bounds and pixel lookups.
//!
//! Run:
//! - `cargo run -p understory_row_model_demos --example row_model_visible_window`

use understory_row_model::{MapRow, RowModel, RowModelOptions};

const VIEWPORT_H: f64 = 100.0;

fn main() {
    let mut options = RowModelOptions::default();
    options.row_height = 20.0;
    let mut model = RowModel::new(options);
    model.set_row_data((0..1000_i64).map(|i| MapRow::new().with("n", i).shared()));
    model.set_pinned_top_rows([MapRow::new().with("n", "total").shared()]);

    // Simulate a few scroll positions by moving the viewport.
    for scroll in [0.0, 30.0, 200.0, 19_990.0] {
        let Some(first) = model.row_index_at_pixel(scroll) else {
            continue;
        };
        let last = model
            .row_index_at_pixel(scroll + VIEWPORT_H - 1.0)
            .unwrap_or(model.row_count() - 1);
        let visible: Vec<_> = (first..=last)
            .filter_map(|i| model.row(i))
            .filter_map(|row| row.data().map(|d| d.value_str("n")))
            .collect();
        let top = model.row_bounds(first).map(|b| b.top).unwrap_or_default();
        println!("scroll={scroll:.1} first_top={top:.1} -> visible rows: {visible:?}");
    }
    println!(
        "total height {:.1}, pinned top rows {}",
        model.total_height(),
        model.pinned_top_row_count()
    );
}
