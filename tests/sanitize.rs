use std::collections::HashMap;

use proptest::prelude::*;
use warehouse_loader::{
    catalog::{ColumnSpec, QualifiedName, StrategyKind, TableSpec},
    data::{Frame, RawRecord},
    reconcile::reconcile,
    sanitize::{remove_exact_duplicates, sanitize},
};

fn code_table() -> TableSpec {
    TableSpec::new(
        QualifiedName::new("stage", "codes"),
        StrategyKind::Upsert,
        vec![
            ColumnSpec::new("id", "integer").not_null(),
            ColumnSpec::new("code", "varchar(3)").max_length(3),
            ColumnSpec::new("label", "text"),
        ],
    )
    .with_key(&["id"])
}

fn record_strategy() -> impl Strategy<Value = RawRecord> {
    proptest::collection::vec(proptest::option::of("[a-c]{0,2}"), 3)
}

fn code_strategy() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[ ]{0,2}[a-zA-Zа-я]{0,6}[ ]{0,2}")
}

proptest! {
    #[test]
    fn dedup_keeps_exactly_the_unique_rows(
        rows in proptest::collection::vec(record_strategy(), 0..24)
    ) {
        let mut counts: HashMap<RawRecord, usize> = HashMap::new();
        for row in &rows {
            *counts.entry(row.clone()).or_default() += 1;
        }
        let expected: Vec<RawRecord> = rows
            .iter()
            .filter(|row| counts[*row] == 1)
            .cloned()
            .collect();
        let frame = Frame::new(vec!["a".into(), "b".into(), "c".into()], rows.clone());

        let (deduped, removed) = remove_exact_duplicates(frame);

        prop_assert_eq!(&deduped.rows, &expected);
        prop_assert_eq!(removed, rows.len() - expected.len());
    }

    #[test]
    fn length_limited_values_fit_and_are_never_blank(
        codes in proptest::collection::vec(code_strategy(), 1..16)
    ) {
        let rows: Vec<RawRecord> = codes
            .iter()
            .enumerate()
            .map(|(idx, code)| vec![Some(idx.to_string()), code.clone(), None])
            .collect();
        let frame = Frame::new(vec!["id".into(), "code".into(), "label".into()], rows);

        let (cleaned, report) = sanitize(frame, &code_table());

        prop_assert_eq!(cleaned.len(), codes.len());
        prop_assert_eq!(report.output_rows, codes.len());
        for (row, original) in cleaned.rows.iter().zip(&codes) {
            match &row[1] {
                Some(value) => {
                    prop_assert!(value.chars().count() <= 3);
                    prop_assert!(!value.trim().is_empty());
                    prop_assert_eq!(value.trim(), value.as_str());
                    let source = original.as_deref().unwrap_or_default().trim();
                    prop_assert!(source.starts_with(value.as_str()));
                }
                None => {
                    prop_assert!(original.as_deref().is_none_or(|v| v.trim().is_empty()));
                }
            }
        }
    }

    #[test]
    fn reconciled_columns_follow_the_write_template(
        order in Just(vec!["label", "extra", "code", "id"]).prop_shuffle(),
        values in proptest::collection::vec("[0-9]{1,3}", 4)
    ) {
        let headers: Vec<String> = order.iter().map(|h| h.to_string()).collect();
        let row: RawRecord = values.iter().cloned().map(Some).collect();
        let frame = Frame::new(headers.clone(), vec![row]);

        let batch = reconcile(frame, &code_table()).expect("all columns present");

        prop_assert_eq!(batch.columns.clone(), vec!["id", "code", "label"]);
        for (out_idx, column) in batch.columns.iter().enumerate() {
            let in_idx = headers.iter().position(|h| h == column).unwrap();
            prop_assert_eq!(batch.rows[0][out_idx].as_deref(), Some(values[in_idx].as_str()));
        }
    }
}
