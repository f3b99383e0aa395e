//! Model breakdown table and overall statistics block.
//!
//! Counts are shown at full precision with comma grouping; the compact
//! `K`/`M`/`B` style is reserved for charts and the tray label.

use crate::models::{TokenCounts, UsageSummary};
use crate::units::format_with_commas;
use std::fmt::Write as _;

const HEADERS: [&str; 7] = [
    "Model",
    "Messages",
    "Input",
    "Output",
    "Cache Create",
    "Cache Read",
    "Total",
];

const COLUMN_GAP: &str = "  ";

fn row_cells(model: &str, counts: &TokenCounts) -> [String; 7] {
    [
        model.to_string(),
        format_with_commas(counts.messages),
        format_with_commas(counts.input_tokens),
        format_with_commas(counts.output_tokens),
        format_with_commas(counts.cache_creation_tokens),
        format_with_commas(counts.cache_read_tokens),
        format_with_commas(counts.total_tokens()),
    ]
}

fn format_row(cells: &[String; 7], widths: &[usize; 7]) -> String {
    let mut line = String::new();
    for (column, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if column > 0 {
            line.push_str(COLUMN_GAP);
        }
        if column == 0 {
            let _ = write!(line, "{:<w$}", cell, w = width);
        } else {
            let _ = write!(line, "{:>w$}", cell, w = width);
        }
    }
    line.trim_end().to_string()
}

/// Per-model table ordered by message count, with a closing `TOTAL` row.
pub fn render_model_table(summary: &UsageSummary) -> String {
    let mut rows: Vec<[String; 7]> = summary
        .models_by_usage()
        .into_iter()
        .map(|(model, counts)| row_cells(model, counts))
        .collect();
    let total: TokenCounts = summary.models.values().sum();
    let total_row = row_cells("TOTAL", &total);

    let header = HEADERS.map(str::to_string);
    let mut widths = [0usize; 7];
    for cells in std::iter::once(&header)
        .chain(rows.iter())
        .chain(std::iter::once(&total_row))
    {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let table_width = widths.iter().sum::<usize>() + COLUMN_GAP.len() * (widths.len() - 1);

    let mut out = String::new();
    let _ = writeln!(out, "Usage by Model");
    let _ = writeln!(out, "{}", "=".repeat(table_width));
    let _ = writeln!(out, "{}", format_row(&header, &widths));
    let _ = writeln!(out, "{}", "-".repeat(table_width));
    for cells in rows.drain(..) {
        let _ = writeln!(out, "{}", format_row(&cells, &widths));
    }
    let _ = writeln!(out, "{}", "-".repeat(table_width));
    let _ = write!(out, "{}", format_row(&total_row, &widths));
    out
}

/// Totals across every model, one figure per line.
pub fn render_overall_stats(totals: &TokenCounts) -> String {
    let line = |label: &str, value: u64| format!("{:<23}{}", label, format_with_commas(value));

    [
        "Overall Usage Statistics".to_string(),
        "=".repeat(50),
        String::new(),
        line("Total messages:", totals.messages),
        String::new(),
        line("Input tokens:", totals.input_tokens),
        line("Output tokens:", totals.output_tokens),
        line("Cache creation tokens:", totals.cache_creation_tokens),
        line("Cache read tokens:", totals.cache_read_tokens),
        String::new(),
        line("Total tokens:", totals.total_tokens()),
    ]
    .join("\n")
}
