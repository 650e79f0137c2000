//! Error kinds raised by the load pipeline and the warehouse backends.
//!
//! Row-level defects never show up here: the sanitizer degrades bad values to
//! nulls or drops the row. Everything in [`LoadError`] is table-level and
//! aborts the run.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a [`crate::store::Warehouse`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },

    #[error("Unknown table {0}")]
    UnknownTable(String),

    #[error("Unknown run id {0}")]
    UnknownRun(i64),

    #[error("Run {0} already reached a terminal state")]
    RunAlreadyFinished(i64),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<postgres::Error> for StoreError {
    fn from(err: postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => StoreError::Query(format!("{} ({})", db.message(), db.code().code())),
            None if err.is_closed() => StoreError::Connection(err.to_string()),
            None => StoreError::Query(err.to_string()),
        }
    }
}

impl From<csv::Error> for StoreError {
    fn from(err: csv::Error) -> Self {
        StoreError::Csv(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    /// No candidate encoding decoded the file.
    #[error("Unable to decode {path:?} with any of: {}", tried.join(", "))]
    UnreadableFile { path: PathBuf, tried: Vec<String> },

    #[error("{table}: missing required column(s) {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    /// The destination store rejected the batch; the table's transaction was rolled back.
    #[error("{table}: write failed: {source}")]
    Write {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Malformed delimited data in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid table spec '{table}': {reason}")]
    InvalidTableSpec { table: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub fn invalid_spec(table: impl Into<String>, reason: impl Into<String>) -> Self {
        LoadError::InvalidTableSpec {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
