#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};
use warehouse_loader::catalog::{ColumnSpec, QualifiedName, StrategyKind, TableSpec};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read temp file")
    }
}

/// Joins `header` and `rows` into a `;`-separated extract.
pub fn extract(header: &str, rows: &[String]) -> String {
    let mut text = String::from(header);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

pub fn qualified(name: &str) -> QualifiedName {
    name.parse().expect("valid table name")
}

/// `id` keyed table with a required `amount` column.
pub fn keyed_table(name: &str, strategy: StrategyKind) -> TableSpec {
    let spec = TableSpec::new(
        qualified(name),
        strategy,
        vec![
            ColumnSpec::new("id", "integer").not_null(),
            ColumnSpec::new("amount", "numeric").not_null(),
        ],
    );
    match strategy {
        StrategyKind::TruncateReload => spec,
        _ => spec.with_key(&["id"]),
    }
}
