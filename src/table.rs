use std::fmt::Write as _;

use crate::pipeline::{RunSummary, TableStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

pub fn render_table(headers: &[&str], align: &[Align], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths, align));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths, align));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, align));
    }
    output
}

fn format_row(values: &[String], widths: &[usize], align: &[Align]) -> String {
    let cells = values
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(idx, (value, width))| {
            let value = value.replace(['\n', '\r', '\t'], " ");
            match align.get(idx).copied().unwrap_or(Align::Left) {
                Align::Left => format!("{value:<width$}"),
                Align::Right => format!("{value:>width$}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

pub fn render_run_summary(summary: &RunSummary) -> String {
    let rows = summary
        .tables
        .iter()
        .map(|outcome| {
            let report = outcome.sanitize.clone().unwrap_or_default();
            let status = match outcome.status {
                TableStatus::Loaded => "loaded",
                TableStatus::MissingFile => "missing file",
                TableStatus::Empty => "empty",
            };
            vec![
                outcome.table.clone(),
                outcome.strategy.to_string(),
                status.to_string(),
                outcome.write.attempted.to_string(),
                report.duplicates_removed.to_string(),
                report.rows_dropped.to_string(),
                report.values_truncated.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    let mut output = render_table(
        &["table", "strategy", "status", "rows", "duplicates", "dropped", "truncated"],
        &[
            Align::Left,
            Align::Left,
            Align::Left,
            Align::Right,
            Align::Right,
            Align::Right,
            Align::Right,
        ],
        &rows,
    );
    let _ = writeln!(
        output,
        "run {} {}: {} row(s) loaded",
        summary.run.run_id,
        summary.run.status,
        summary.rows_loaded()
    );
    output
}
