use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use log::info;

use crate::{
    run_log::RunLogger,
    store::{ExportRequest, ImportRequest, Warehouse},
};

pub const EXPORT_TASK_ID: &str = "export";
pub const IMPORT_TASK_ID: &str = "import";

/// Writes the requested rows to `path`; returns the exported row count.
pub fn export_table<W>(
    store: &mut W,
    logger: &RunLogger,
    request: &ExportRequest,
    path: &Path,
) -> Result<u64>
where
    W: Warehouse + ?Sized,
{
    let note = path.display().to_string();
    let run = logger.begin(store, Some(&note))?;
    let result = File::create(path)
        .with_context(|| format!("Creating export file {path:?}"))
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            let count = store
                .export_csv(request, &mut writer)
                .with_context(|| format!("Exporting {}", request.table))?;
            writer.flush().context("Flushing export file")?;
            Ok(count)
        });
    match result {
        Ok(count) => {
            run.succeed(store, count)?;
            info!("Exported {count} row(s) from {} -> {:?}", request.table, path);
            Ok(count)
        }
        Err(err) => {
            run.fail_quietly(store, None, &format!("{err:#}"));
            Err(err)
        }
    }
}

/// Reloads the import target from `path`; returns the target's row count.
pub fn import_table<W>(
    store: &mut W,
    logger: &RunLogger,
    request: &ImportRequest,
    path: &Path,
) -> Result<u64>
where
    W: Warehouse + ?Sized,
{
    let note = path.display().to_string();
    let run = logger.begin(store, Some(&note))?;
    let result = File::open(path)
        .with_context(|| format!("Opening import file {path:?}"))
        .and_then(|file| {
            let mut reader = BufReader::new(file);
            store
                .import_csv(request, &mut reader)
                .with_context(|| format!("Importing into {}", request.target))
        });
    match result {
        Ok(count) => {
            run.succeed(store, count)?;
            info!("Imported {count} row(s) into {} <- {:?}", request.target, path);
            Ok(count)
        }
        Err(err) => {
            run.fail_quietly(store, None, &format!("{err:#}"));
            Err(err)
        }
    }
}
