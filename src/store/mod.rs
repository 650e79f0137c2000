//! Destination store abstraction.
//!
//! The pipeline talks to the warehouse only through [`Warehouse`]. All calls
//! are blocking and issued sequentially over one connection per invocation.
//!
//! - [`postgres::PostgresWarehouse`]: the production backend.
//! - [`memory::MemoryWarehouse`]: in-process tables with the same conflict
//!   semantics, used for `--dry-run` and tests.

use std::io::{Read, Write};

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    catalog::{QualifiedName, TableSpec},
    error::StoreError,
    reconcile::CleanBatch,
    run_log::{RunRecord, RunStatus},
    strategy::WritePlan,
};

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryWarehouse;
pub use self::postgres::PostgresWarehouse;

/// Result of one batch write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    /// Rows sent to the store; this is what counts toward rows-loaded.
    pub attempted: u64,
    /// Rows the store reports as inserted or updated.
    pub affected: u64,
}

/// Rows of `table` whose `date_column` equals `to_date`, sorted by `order_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub table: QualifiedName,
    pub date_column: String,
    pub to_date: NaiveDate,
    pub order_by: Vec<String>,
}

/// Reload `target` (a structural copy of `source`) from CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub source: QualifiedName,
    pub target: QualifiedName,
}

pub trait Warehouse {
    fn backend_name(&self) -> &'static str;

    /// Creates the run-history table when it does not exist.
    fn ensure_run_log(&mut self) -> Result<(), StoreError>;

    /// Inserts a `running` row stamped with the current time.
    fn insert_run(
        &mut self,
        process_id: &str,
        task_id: &str,
        note: Option<&str>,
    ) -> Result<RunRecord, StoreError>;

    /// Moves a running row to a terminal status. `None` for rows or note keeps
    /// the stored value.
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        rows_loaded: Option<i64>,
        note: Option<&str>,
    ) -> Result<RunRecord, StoreError>;

    /// Creates the destination table from its spec when it does not exist.
    fn ensure_table(&mut self, spec: &TableSpec) -> Result<(), StoreError>;

    /// Writes the whole batch atomically according to `plan`.
    fn write_batch(
        &mut self,
        spec: &TableSpec,
        plan: &WritePlan,
        batch: &CleanBatch,
    ) -> Result<WriteOutcome, StoreError>;

    /// Streams matching rows as comma-separated CSV with a header; returns
    /// the number of data rows.
    fn export_csv(
        &mut self,
        request: &ExportRequest,
        out: &mut dyn Write,
    ) -> Result<u64, StoreError>;

    /// Truncates the target and bulk-loads CSV with a header row; returns the
    /// resulting row count of the target.
    fn import_csv(
        &mut self,
        request: &ImportRequest,
        input: &mut dyn Read,
    ) -> Result<u64, StoreError>;
}
