//! In-process warehouse.
//!
//! Mirrors the PostgreSQL backend closely enough to exercise the pipeline
//! end to end: NOT NULL and primary-key constraints are enforced, each batch
//! is applied to a staged copy and committed only when every row succeeds,
//! and finished runs cannot be finished again.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    io::{Read, Write},
};

use chrono::Utc;

use super::{ExportRequest, ImportRequest, Warehouse, WriteOutcome};
use crate::{
    catalog::{QualifiedName, TableSpec},
    data::Cell,
    error::StoreError,
    io_utils::{DEFAULT_EXCHANGE_DELIMITER, csv_writer_for, open_csv_reader},
    reconcile::CleanBatch,
    run_log::{RunRecord, RunStatus},
    strategy::WritePlan,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryColumn {
    pub name: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTable {
    pub columns: Vec<MemoryColumn>,
    pub primary_key: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl MemoryTable {
    pub fn from_spec(spec: &TableSpec) -> Self {
        Self {
            columns: spec
                .columns
                .iter()
                .map(|c| MemoryColumn {
                    name: c.name.clone(),
                    nullable: c.nullable,
                })
                .collect(),
            primary_key: spec.primary_key.clone(),
            rows: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn positions(&self, names: &[String], table: &QualifiedName) -> Result<Vec<usize>, StoreError> {
        names
            .iter()
            .map(|name| {
                self.position(name).ok_or_else(|| StoreError::Query(format!(
                    "column \"{name}\" of relation \"{table}\" does not exist"
                )))
            })
            .collect()
    }

    fn check_not_null(&self, row: &[Cell], table: &QualifiedName) -> Result<(), StoreError> {
        for (column, value) in self.columns.iter().zip(row) {
            if !column.nullable && value.is_none() {
                return Err(StoreError::Constraint {
                    table: table.to_string(),
                    message: format!(
                        "null value in column \"{}\" violates not-null constraint",
                        column.name
                    ),
                });
            }
        }
        Ok(())
    }

    fn find_by_key(rows: &[Vec<Cell>], key: &[usize], candidate: &[Cell]) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        rows.iter()
            .position(|row| key.iter().all(|&idx| row[idx] == candidate[idx]))
    }
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: BTreeMap<String, MemoryTable>,
    runs: Vec<RunRecord>,
    run_log_ready: bool,
    write_attempts: Vec<QualifiedName>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table and fills it with `rows`.
    pub fn seed(&mut self, spec: &TableSpec, rows: Vec<Vec<Cell>>) {
        let mut table = MemoryTable::from_spec(spec);
        table.rows = rows;
        self.tables.insert(spec.table.to_string(), table);
    }

    pub fn table(&self, name: &QualifiedName) -> Option<&MemoryTable> {
        self.tables.get(&name.to_string())
    }

    pub fn rows(&self, name: &QualifiedName) -> Option<&[Vec<Cell>]> {
        self.table(name).map(|t| t.rows.as_slice())
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    /// Tables that reached `write_batch`, in call order.
    pub fn write_attempts(&self) -> &[QualifiedName] {
        &self.write_attempts
    }

    fn table_mut(&mut self, name: &QualifiedName) -> Result<&mut MemoryTable, StoreError> {
        self.tables
            .get_mut(&name.to_string())
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }
}

impl Warehouse for MemoryWarehouse {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn ensure_run_log(&mut self) -> Result<(), StoreError> {
        self.run_log_ready = true;
        Ok(())
    }

    fn insert_run(
        &mut self,
        process_id: &str,
        task_id: &str,
        note: Option<&str>,
    ) -> Result<RunRecord, StoreError> {
        if !self.run_log_ready {
            return Err(StoreError::UnknownTable("run log".to_string()));
        }
        let record = RunRecord {
            run_id: self.runs.len() as i64 + 1,
            process_id: process_id.to_string(),
            task_id: task_id.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            rows_loaded: None,
            note: note.map(str::to_string),
        };
        self.runs.push(record.clone());
        Ok(record)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        rows_loaded: Option<i64>,
        note: Option<&str>,
    ) -> Result<RunRecord, StoreError> {
        let record = self
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or(StoreError::UnknownRun(run_id))?;
        if !record.status.can_transition_to(status) {
            return Err(StoreError::RunAlreadyFinished(run_id));
        }
        record.status = status;
        record.finished_at = Some(Utc::now());
        if rows_loaded.is_some() {
            record.rows_loaded = rows_loaded;
        }
        if let Some(note) = note {
            record.note = Some(note.to_string());
        }
        Ok(record.clone())
    }

    fn ensure_table(&mut self, spec: &TableSpec) -> Result<(), StoreError> {
        self.tables
            .entry(spec.table.to_string())
            .or_insert_with(|| MemoryTable::from_spec(spec));
        Ok(())
    }

    fn write_batch(
        &mut self,
        spec: &TableSpec,
        plan: &WritePlan,
        batch: &CleanBatch,
    ) -> Result<WriteOutcome, StoreError> {
        self.write_attempts.push(spec.table.clone());
        let table = self.table_mut(&spec.table)?;
        let batch_positions = table.positions(&batch.columns, &spec.table)?;
        let key = table.positions(plan.key_columns(), &spec.table)?;
        let unique = table.positions(&table.primary_key, &spec.table)?;
        let updates = match plan {
            WritePlan::Upsert { update_columns, .. } => {
                table.positions(update_columns, &spec.table)?
            }
            _ => Vec::new(),
        };

        let mut staged = if plan.truncates_first() {
            Vec::new()
        } else {
            table.rows.clone()
        };
        let mut outcome = WriteOutcome::default();
        for incoming in &batch.rows {
            outcome.attempted += 1;
            let mut row: Vec<Cell> = vec![None; table.columns.len()];
            for (value, &idx) in incoming.iter().zip(&batch_positions) {
                row[idx] = value.clone();
            }
            table.check_not_null(&row, &spec.table)?;

            match plan {
                WritePlan::AppendSkip { .. } => {
                    if MemoryTable::find_by_key(&staged, &key, &row).is_none() {
                        staged.push(row);
                        outcome.affected += 1;
                    }
                }
                WritePlan::Upsert { .. } => {
                    match MemoryTable::find_by_key(&staged, &key, &row) {
                        Some(existing) => {
                            for &idx in &updates {
                                staged[existing][idx] = row[idx].clone();
                            }
                        }
                        None => staged.push(row),
                    }
                    outcome.affected += 1;
                }
                WritePlan::TruncateReload => {
                    if MemoryTable::find_by_key(&staged, &unique, &row).is_some() {
                        return Err(StoreError::Constraint {
                            table: spec.table.to_string(),
                            message: "duplicate key value violates unique constraint".to_string(),
                        });
                    }
                    staged.push(row);
                    outcome.affected += 1;
                }
            }
        }
        table.rows = staged;
        Ok(outcome)
    }

    fn export_csv(
        &mut self,
        request: &ExportRequest,
        out: &mut dyn Write,
    ) -> Result<u64, StoreError> {
        let table = self.table_mut(&request.table)?;
        let filter = table.positions(std::slice::from_ref(&request.date_column), &request.table)?[0];
        let order = table.positions(&request.order_by, &request.table)?;
        let wanted = request.to_date.format("%Y-%m-%d").to_string();

        let mut rows: Vec<&Vec<Cell>> = table
            .rows
            .iter()
            .filter(|row| row[filter].as_deref() == Some(wanted.as_str()))
            .collect();
        rows.sort_by(|left, right| {
            order
                .iter()
                .map(|&idx| compare_cells(&left[idx], &right[idx]))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let mut writer = csv_writer_for(out, DEFAULT_EXCHANGE_DELIMITER);
        writer.write_record(table.columns.iter().map(|c| c.name.as_str()))?;
        for row in &rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(rows.len() as u64)
    }

    fn import_csv(
        &mut self,
        request: &ImportRequest,
        input: &mut dyn Read,
    ) -> Result<u64, StoreError> {
        let source = self
            .tables
            .get(&request.source.to_string())
            .ok_or_else(|| StoreError::UnknownTable(request.source.to_string()))?;
        let mut target = self
            .tables
            .get(&request.target.to_string())
            .cloned()
            .unwrap_or_else(|| MemoryTable {
                rows: Vec::new(),
                ..source.clone()
            });

        let mut reader = open_csv_reader(input, DEFAULT_EXCHANGE_DELIMITER, true);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let positions = target.positions(&headers, &request.target)?;
        let unique = target.positions(&target.primary_key, &request.target)?;

        let mut staged = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<Cell> = vec![None; target.columns.len()];
            for (field, &idx) in record.iter().zip(&positions) {
                row[idx] = (!field.is_empty()).then(|| field.to_string());
            }
            target.check_not_null(&row, &request.target)?;
            if MemoryTable::find_by_key(&staged, &unique, &row).is_some() {
                return Err(StoreError::Constraint {
                    table: request.target.to_string(),
                    message: "duplicate key value violates unique constraint".to_string(),
                });
            }
            staged.push(row);
        }
        target.rows = staged;
        let count = target.rows.len() as u64;
        self.tables.insert(request.target.to_string(), target);
        Ok(count)
    }
}

/// Numeric when both sides parse as numbers, textual otherwise; nulls last.
fn compare_cells(left: &Cell, right: &Cell) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(l), Some(r)) => match (l.parse::<f64>(), r.parse::<f64>()) {
            (Ok(a), Ok(b)) => a.total_cmp(&b),
            _ => l.cmp(r),
        },
    }
}
