mod common;

use chrono::NaiveDate;
use common::{TestWorkspace, qualified};
use warehouse_loader::{
    catalog::{ColumnSpec, StrategyKind, TableSpec},
    exchange::{EXPORT_TASK_ID, IMPORT_TASK_ID, export_table, import_table},
    run_log::{RunLogger, RunStatus},
    store::{ExportRequest, ImportRequest, MemoryWarehouse},
};

fn report_table() -> TableSpec {
    TableSpec::new(
        qualified("dm.dm_f101_round_f"),
        StrategyKind::TruncateReload,
        vec![
            ColumnSpec::new("to_date", "date").not_null(),
            ColumnSpec::new("ledger_account", "varchar(5)").not_null(),
            ColumnSpec::new("characteristic", "char(1)"),
            ColumnSpec::new("balance_out", "numeric"),
        ],
    )
}

fn row(values: &[&str]) -> Vec<Option<String>> {
    values
        .iter()
        .map(|v| (!v.is_empty()).then(|| v.to_string()))
        .collect()
}

fn seeded_store() -> MemoryWarehouse {
    let mut store = MemoryWarehouse::new();
    store.seed(
        &report_table(),
        vec![
            row(&["2018-01-31", "30102", "A", "100.5"]),
            row(&["2018-01-31", "20202", "A", ""]),
            row(&["2018-02-28", "10101", "P", "7"]),
            row(&["2018-01-31", "20202", "", "3"]),
        ],
    );
    store
}

fn export_request(to_date: &str) -> ExportRequest {
    ExportRequest {
        table: qualified("dm.dm_f101_round_f"),
        date_column: "to_date".to_string(),
        to_date: NaiveDate::parse_from_str(to_date, "%Y-%m-%d").unwrap(),
        order_by: vec!["ledger_account".to_string(), "characteristic".to_string()],
    }
}

#[test]
fn export_filters_by_date_and_sorts() {
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("f101.csv");
    let mut store = seeded_store();
    let logger = RunLogger::new("csv_loader", EXPORT_TASK_ID);

    let count = export_table(&mut store, &logger, &export_request("2018-01-31"), &path).unwrap();

    assert_eq!(count, 3);
    assert_eq!(
        workspace.read("f101.csv"),
        "to_date,ledger_account,characteristic,balance_out\n\
         2018-01-31,20202,A,\n\
         2018-01-31,20202,,3\n\
         2018-01-31,30102,A,100.5\n"
    );
    let run = &store.runs()[0];
    assert_eq!(run.task_id, EXPORT_TASK_ID);
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.rows_loaded, Some(3));
}

#[test]
fn export_round_trips_into_a_versioned_copy() {
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("f101.csv");
    let mut store = seeded_store();
    export_table(
        &mut store,
        &RunLogger::new("csv_loader", EXPORT_TASK_ID),
        &export_request("2018-01-31"),
        &path,
    )
    .unwrap();

    let source = qualified("dm.dm_f101_round_f");
    let request = ImportRequest {
        target: source.with_suffix("_v2"),
        source,
    };
    let logger = RunLogger::new("csv_loader", IMPORT_TASK_ID);
    let count = import_table(&mut store, &logger, &request, &path).unwrap();

    assert_eq!(count, 3);
    let copied = store.rows(&request.target).unwrap();
    assert_eq!(copied[0], row(&["2018-01-31", "20202", "A", ""]));
    assert_eq!(store.rows(&request.source).unwrap().len(), 4);

    // A second import replaces rather than appends.
    assert_eq!(import_table(&mut store, &logger, &request, &path).unwrap(), 3);
    assert_eq!(store.rows(&request.target).unwrap().len(), 3);
    let statuses: Vec<_> = store.runs().iter().map(|r| (r.task_id.as_str(), r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (EXPORT_TASK_ID, RunStatus::Success),
            (IMPORT_TASK_ID, RunStatus::Success),
            (IMPORT_TASK_ID, RunStatus::Success),
        ]
    );
}

#[test]
fn failed_export_is_recorded() {
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("missing.csv");
    let mut store = MemoryWarehouse::new();
    let mut request = export_request("2018-01-31");
    request.table = qualified("dm.not_there");

    let err = export_table(
        &mut store,
        &RunLogger::new("csv_loader", EXPORT_TASK_ID),
        &request,
        &path,
    )
    .unwrap_err();

    assert!(format!("{err:#}").contains("dm.not_there"));
    let run = &store.runs()[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.note.as_deref().unwrap().contains("dm.not_there"));
}

#[test]
fn import_rejects_rows_breaking_not_null() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "broken.csv",
        "to_date,ledger_account,characteristic,balance_out\n2018-01-31,,A,1\n",
    );
    let mut store = seeded_store();
    let request = ImportRequest {
        source: qualified("dm.dm_f101_round_f"),
        target: qualified("dm.dm_f101_round_f_v2"),
    };

    let result = import_table(
        &mut store,
        &RunLogger::new("csv_loader", IMPORT_TASK_ID),
        &request,
        &path,
    );

    assert!(result.is_err());
    assert!(store.rows(&request.target).is_none());
    assert_eq!(store.runs()[0].status, RunStatus::Failed);
}
