//! Row sanitizer: exact-duplicate removal, date coercion, and length
//! enforcement, applied in that order.
//!
//! None of these steps fail. Defective values become nulls and defective rows
//! are dropped, so one malformed line never blocks the rest of the batch.
//! Every step can only shrink the row count.

use std::collections::HashMap;

use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

use crate::{
    catalog::TableSpec,
    data::{Cell, Frame, RawRecord},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeReport {
    pub input_rows: usize,
    /// Every copy of a duplicated row is counted, not just the extras.
    pub duplicates_removed: usize,
    pub dates_nulled: usize,
    /// Rows dropped because a NOT NULL date column ended up null.
    pub rows_dropped: usize,
    pub values_truncated: usize,
    pub values_nulled: usize,
    pub output_rows: usize,
}

pub fn sanitize(frame: Frame, spec: &TableSpec) -> (Frame, SanitizeReport) {
    let mut report = SanitizeReport {
        input_rows: frame.len(),
        ..SanitizeReport::default()
    };
    let (mut frame, removed) = remove_exact_duplicates(frame);
    report.duplicates_removed = removed;
    if removed > 0 {
        warn!(
            "{}: found {removed} duplicated row(s); all copies skipped",
            spec.table
        );
    }

    coerce_dates(&mut frame, spec, &mut report);
    enforce_length_limits(&mut frame, spec, &mut report);

    report.output_rows = frame.len();
    if report.rows_dropped > 0 {
        warn!(
            "{}: dropped {} row(s) with missing or unparsable required dates",
            spec.table, report.rows_dropped
        );
    }
    if report.values_truncated > 0 {
        info!(
            "{}: truncated {} value(s) to their column length limit",
            spec.table, report.values_truncated
        );
    }
    (frame, report)
}

/// Removes every row that has an identical twin anywhere in the frame. No
/// representative copy is kept.
pub fn remove_exact_duplicates(frame: Frame) -> (Frame, usize) {
    let counts: HashMap<&RawRecord, usize> = frame.rows.iter().counts();
    if counts.values().all(|&count| count == 1) {
        return (frame, 0);
    }
    let keep: Vec<bool> = frame.rows.iter().map(|row| counts[row] == 1).collect();
    let before = frame.rows.len();
    let Frame { headers, rows } = frame;
    let rows: Vec<RawRecord> = rows
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();
    let removed = before - rows.len();
    (Frame { headers, rows }, removed)
}

/// Rewrites declared date columns to `YYYY-MM-DD`. Unparsable values become
/// null; rows left with a null in a NOT NULL date column are removed.
pub fn coerce_dates(frame: &mut Frame, spec: &TableSpec, report: &mut SanitizeReport) {
    let mut required = Vec::new();
    for (column, format) in spec.date_columns() {
        let Some(idx) = frame.column_index(&column.name) else {
            continue;
        };
        for row in &mut frame.rows {
            let Some(cell) = row.get_mut(idx) else {
                continue;
            };
            if let Some(raw) = cell.as_deref() {
                match format.parse(raw) {
                    Some(date) => *cell = Some(date.format("%Y-%m-%d").to_string()),
                    None => {
                        *cell = None;
                        report.dates_nulled += 1;
                    }
                }
            }
        }
        if !column.nullable {
            required.push(idx);
        }
    }
    if required.is_empty() {
        return;
    }
    let before = frame.rows.len();
    frame
        .rows
        .retain(|row| required.iter().all(|&idx| matches!(row.get(idx), Some(Some(_)))));
    report.rows_dropped += before - frame.rows.len();
}

/// Trims and truncates values of length-limited columns to at most `limit`
/// characters. Values empty after trimming become null.
pub fn enforce_length_limits(frame: &mut Frame, spec: &TableSpec, report: &mut SanitizeReport) {
    for (column, limit) in spec.length_limits() {
        let Some(idx) = frame.column_index(&column.name) else {
            continue;
        };
        for row in &mut frame.rows {
            if let Some(cell) = row.get_mut(idx) {
                *cell = fit_to_length(cell.take(), limit, report);
            }
        }
    }
}

fn fit_to_length(cell: Cell, limit: usize, report: &mut SanitizeReport) -> Cell {
    let value = cell?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        report.values_nulled += 1;
        return None;
    }
    if trimmed.chars().count() > limit {
        report.values_truncated += 1;
        return Some(trimmed.chars().take(limit).collect());
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnSpec, DateFormat, QualifiedName, StrategyKind};

    fn row(values: &[&str]) -> RawRecord {
        values
            .iter()
            .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
            .collect()
    }

    fn spec() -> TableSpec {
        TableSpec::new(
            QualifiedName::new("ds", "t"),
            StrategyKind::TruncateReload,
            vec![
                ColumnSpec::new("on_date", "date")
                    .not_null()
                    .date(DateFormat::DayDotMonthDotYear),
                ColumnSpec::new("end_date", "date").date(DateFormat::DayDotMonthDotYear),
                ColumnSpec::new("code", "varchar(3)").max_length(3),
            ],
        )
    }

    fn frame(rows: Vec<RawRecord>) -> Frame {
        Frame::new(
            vec!["on_date".into(), "end_date".into(), "code".into()],
            rows,
        )
    }

    // Documented behaviour inherited from the legacy loader: no copy of a
    // duplicated row survives. Keep this pinned until product confirms whether
    // one representative should be kept instead.
    #[test]
    fn documented_policy_duplicates_drop_every_copy() {
        let input = frame(vec![
            row(&["01.03.2021", "", "USD"]),
            row(&["02.03.2021", "", "EUR"]),
            row(&["01.03.2021", "", "USD"]),
        ]);
        let (out, removed) = remove_exact_duplicates(input);
        assert_eq!(removed, 2);
        assert_eq!(out.rows, vec![row(&["02.03.2021", "", "EUR"])]);
    }

    #[test]
    fn missing_value_tokens_compare_equal_when_deduplicating() {
        let input = Frame::from_text(
            ["a", "b"],
            vec![
                vec!["1".to_string(), String::new()],
                vec!["1".to_string(), "NULL".to_string()],
                vec!["2".to_string(), "x".to_string()],
            ],
        );
        let (out, removed) = remove_exact_duplicates(input);
        assert_eq!(removed, 2);
        assert_eq!(out.rows, vec![vec![Some("2".to_string()), Some("x".to_string())]]);
    }

    #[test]
    fn required_date_failures_drop_row_optional_ones_null() {
        let input = frame(vec![
            row(&["31.02.2021", "", "USD"]),
            row(&["01.03.2021", "garbage", "EUR"]),
            row(&["nan", "", "RUB"]),
        ]);
        let (out, report) = sanitize(input, &spec());
        assert_eq!(out.rows, vec![row(&["2021-03-01", "", "EUR"])]);
        assert_eq!(report.rows_dropped, 2);
        assert_eq!(report.dates_nulled, 3);
    }

    #[test]
    fn length_limits_trim_truncate_and_null() {
        let input = frame(vec![
            row(&["01.03.2021", "", " USDX "]),
            row(&["02.03.2021", "", "   "]),
            row(&["03.03.2021", "", "ab"]),
        ]);
        let mut out = input.clone();
        let mut report = SanitizeReport::default();
        enforce_length_limits(&mut out, &spec(), &mut report);
        assert_eq!(out.rows[0][2].as_deref(), Some("USD"));
        assert_eq!(out.rows[1][2], None);
        assert_eq!(out.rows[2][2].as_deref(), Some("ab"));
        assert_eq!(report.values_truncated, 1);
        assert_eq!(report.values_nulled, 1);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let mut report = SanitizeReport::default();
        let fitted = fit_to_length(Some("Рубль".to_string()), 3, &mut report);
        assert_eq!(fitted.as_deref(), Some("Руб"));
    }

    #[test]
    fn columns_absent_from_frame_are_ignored() {
        let input = Frame::new(vec!["other".into()], vec![row(&["x"])]);
        let (out, report) = sanitize(input, &spec());
        assert_eq!(out.rows.len(), 1);
        assert_eq!(report.rows_dropped, 0);
    }
}
