//! Pipeline orchestration.
//!
//! Tables load one at a time in catalog order. For each table the source file
//! is decoded, normalized, sanitized, reconciled against the table spec and
//! written with the table's strategy. A missing file is skipped with a
//! warning. The first table-level error stops the run: the run record is
//! marked `failed` with the error text and the rows loaded so far, and the
//! error is returned to the caller.

use std::path::Path;

use log::{error, info, warn};
use serde::Serialize;

use crate::{
    catalog::{SourceFile, StrategyKind, TableSpec},
    config::LoaderConfig,
    error::{LoadError, LoadResult},
    io_utils::{self, printable_delimiter},
    reconcile::reconcile,
    run_log::{RunLogger, RunRecord},
    sanitize::{SanitizeReport, sanitize},
    store::{Warehouse, WriteOutcome},
    strategy::WritePlan,
};

pub const LOAD_TASK_ID: &str = "load";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableStatus {
    Loaded,
    /// The source file does not exist.
    MissingFile,
    /// Nothing survived sanitization; no write was issued.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub strategy: StrategyKind,
    pub status: TableStatus,
    pub write: WriteOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitize: Option<SanitizeReport>,
}

impl TableOutcome {
    fn skipped(spec: &TableSpec, status: TableStatus, report: Option<SanitizeReport>) -> Self {
        Self {
            table: spec.table.to_string(),
            strategy: spec.strategy,
            status,
            write: WriteOutcome::default(),
            sanitize: report,
        }
    }

    pub fn rows_loaded(&self) -> u64 {
        self.write.attempted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run: RunRecord,
    pub tables: Vec<TableOutcome>,
}

impl RunSummary {
    pub fn rows_loaded(&self) -> u64 {
        self.tables.iter().map(TableOutcome::rows_loaded).sum()
    }
}

pub struct Orchestrator<'a> {
    data_dir: &'a Path,
    logger: RunLogger,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a LoaderConfig) -> Self {
        Self {
            data_dir: &config.data_dir,
            logger: RunLogger::new(config.process_id.clone(), LOAD_TASK_ID),
        }
    }

    pub fn with_logger(data_dir: &'a Path, logger: RunLogger) -> Self {
        Self { data_dir, logger }
    }

    /// Loads `tables` in order inside one run record.
    pub fn run<W>(&self, store: &mut W, tables: &[&TableSpec]) -> LoadResult<RunSummary>
    where
        W: Warehouse + ?Sized,
    {
        let note = self.data_dir.display().to_string();
        let run = self.logger.begin(store, Some(&note))?;
        info!(
            "Loading {} table(s) from {:?} into {}",
            tables.len(),
            self.data_dir,
            store.backend_name()
        );

        let mut outcomes = Vec::with_capacity(tables.len());
        let mut total = 0u64;
        for spec in tables {
            let source = spec.source_file(self.data_dir);
            match load_table(store, spec, &source) {
                Ok(outcome) => {
                    total += outcome.rows_loaded();
                    outcomes.push(outcome);
                }
                Err(err) => {
                    error!("{}: {err}", spec.table);
                    run.fail_quietly(store, Some(total), &err.to_string());
                    return Err(err);
                }
            }
        }

        let record = run.succeed(store, total)?;
        Ok(RunSummary {
            run: record,
            tables: outcomes,
        })
    }
}

/// Runs one table through decode, sanitize, reconcile and write.
pub fn load_table<W>(store: &mut W, spec: &TableSpec, source: &SourceFile) -> LoadResult<TableOutcome>
where
    W: Warehouse + ?Sized,
{
    let plan = WritePlan::resolve(spec)?;
    if !source.path.exists() {
        warn!("{}: source file {:?} not found; skipping", spec.table, source.path);
        return Ok(TableOutcome::skipped(spec, TableStatus::MissingFile, None));
    }
    info!(
        "{}: reading {:?} (delimiter '{}')",
        spec.table,
        source.path,
        printable_delimiter(source.delimiter)
    );

    let frame = io_utils::read_delimited(&source.path, source.delimiter)?;
    let (frame, report) = sanitize(frame, spec);
    let batch = reconcile(frame, spec)?;
    if batch.is_empty() {
        warn!("{}: no rows left after cleaning; skipping write", spec.table);
        return Ok(TableOutcome::skipped(spec, TableStatus::Empty, Some(report)));
    }

    let write_failed = |source| LoadError::Write {
        table: spec.table.to_string(),
        source,
    };
    store.ensure_table(spec).map_err(write_failed)?;
    let write = store
        .write_batch(spec, &plan, &batch)
        .map_err(write_failed)?;
    info!(
        "{}: {} row(s) written with {} ({} affected)",
        spec.table,
        write.attempted,
        plan.kind(),
        write.affected
    );
    Ok(TableOutcome {
        table: spec.table.to_string(),
        strategy: spec.strategy,
        status: TableStatus::Loaded,
        write,
        sanitize: Some(report),
    })
}
