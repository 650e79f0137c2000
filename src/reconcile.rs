use log::debug;

use crate::{
    catalog::TableSpec,
    data::{Cell, Frame},
    error::{LoadError, LoadResult},
};

/// Rows ready for the write layer: exactly the table's columns, in
/// write-template order, nulls as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl CleanBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn reconcile(frame: Frame, spec: &TableSpec) -> LoadResult<CleanBatch> {
    let required = spec.column_names();
    let positions: Vec<Option<usize>> = required
        .iter()
        .map(|name| frame.column_index(name))
        .collect();

    let missing: Vec<String> = required
        .iter()
        .zip(&positions)
        .filter(|(_, pos)| pos.is_none())
        .map(|(name, _)| name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns {
            table: spec.table.to_string(),
            columns: missing,
        });
    }

    let positions: Vec<usize> = positions.into_iter().flatten().collect();
    let extra = frame
        .headers
        .iter()
        .filter(|h| !required.contains(*h))
        .count();
    if extra > 0 {
        debug!("{}: ignoring {extra} column(s) not in the write template", spec.table);
    }

    let rows = frame
        .rows
        .into_iter()
        .map(|mut row| {
            positions
                .iter()
                .map(|&idx| row.get_mut(idx).and_then(Option::take))
                .collect()
        })
        .collect();
    Ok(CleanBatch {
        columns: required,
        rows,
    })
}
