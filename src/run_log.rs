//! Run history.
//!
//! Every invocation gets one row in the run-history table. The row is
//! inserted as `running` and updated exactly once to `success` or `failed`.
//! [`ActiveRun`] is consumed by that update, so a finished run cannot be
//! finished again through this API; the stores reject it as well.

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{error::StoreError, store::Warehouse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        self == RunStatus::Running && next.is_terminal()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" | "started" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(anyhow!("Unknown run status '{other}'")),
        }
    }
}

/// One row of the run-history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: i64,
    pub process_id: String,
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub rows_loaded: Option<i64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunLogger {
    process_id: String,
    task_id: String,
}

impl RunLogger {
    pub fn new(process_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            task_id: task_id.into(),
        }
    }

    /// Creates the history table if needed and records a `running` row.
    pub fn begin<W>(&self, store: &mut W, note: Option<&str>) -> Result<ActiveRun, StoreError>
    where
        W: Warehouse + ?Sized,
    {
        store.ensure_run_log()?;
        let record = store.insert_run(&self.process_id, &self.task_id, note)?;
        info!(
            "Run {} started ({}/{})",
            record.run_id, record.process_id, record.task_id
        );
        Ok(ActiveRun { record })
    }
}

/// A run that has not reached a terminal state yet.
#[derive(Debug)]
#[must_use = "a run must be finished with succeed() or fail()"]
pub struct ActiveRun {
    record: RunRecord,
}

impl ActiveRun {
    pub fn run_id(&self) -> i64 {
        self.record.run_id
    }

    pub fn succeed<W>(self, store: &mut W, rows_loaded: u64) -> Result<RunRecord, StoreError>
    where
        W: Warehouse + ?Sized,
    {
        self.finish(store, RunStatus::Success, Some(rows_loaded), None)
    }

    pub fn fail<W>(
        self,
        store: &mut W,
        rows_loaded: Option<u64>,
        note: &str,
    ) -> Result<RunRecord, StoreError>
    where
        W: Warehouse + ?Sized,
    {
        self.finish(store, RunStatus::Failed, rows_loaded, Some(note))
    }

    /// Marks the run failed, logging rather than returning a secondary error
    /// so the caller can surface the original failure.
    pub fn fail_quietly<W>(self, store: &mut W, rows_loaded: Option<u64>, note: &str)
    where
        W: Warehouse + ?Sized,
    {
        let run_id = self.run_id();
        if let Err(err) = self.fail(store, rows_loaded, note) {
            error!("Could not mark run {run_id} as failed: {err}");
        }
    }

    fn finish<W>(
        self,
        store: &mut W,
        status: RunStatus,
        rows_loaded: Option<u64>,
        note: Option<&str>,
    ) -> Result<RunRecord, StoreError>
    where
        W: Warehouse + ?Sized,
    {
        debug_assert!(self.record.status.can_transition_to(status));
        let rows = rows_loaded.map(|rows| i64::try_from(rows).unwrap_or(i64::MAX));
        let record = store.finish_run(self.record.run_id, status, rows, note)?;
        info!(
            "Run {} finished: {} ({} row(s))",
            record.run_id,
            record.status,
            record.rows_loaded.unwrap_or_default()
        );
        Ok(record)
    }
}
