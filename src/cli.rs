use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::catalog::QualifiedName;

pub const DEFAULT_EXCHANGE_TABLE: &str = "dm.dm_f101_round_f";

#[derive(Debug, Parser)]
#[command(author, version, about = "Load delimited extracts into the warehouse", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clean and load every catalog table from a directory of extracts
    Load(LoadArgs),
    /// Export one table's rows for a reporting date to CSV
    Export(ExportArgs),
    /// Reload a copy of a table from a CSV file
    Import(ImportArgs),
    /// Print the effective table catalog as YAML
    Catalog(CatalogArgs),
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Directory holding the source files (defaults to LOADER_DATA_DIR or ./data)
    pub data_dir: Option<PathBuf>,
    /// YAML catalog replacing the built-in table definitions
    #[arg(long)]
    pub catalog: Option<PathBuf>,
    /// Only load these tables (comma-separated, catalog order is kept)
    #[arg(short = 't', long = "tables", value_delimiter = ',')]
    pub tables: Vec<String>,
    /// Run against an in-memory warehouse instead of PostgreSQL
    #[arg(long)]
    pub dry_run: bool,
    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Table to export, as schema.table
    #[arg(long, default_value = DEFAULT_EXCHANGE_TABLE, value_parser = parse_table_name)]
    pub table: QualifiedName,
    /// Reporting date to export (YYYY-MM-DD)
    #[arg(long = "to-date", value_parser = parse_iso_date)]
    pub to_date: NaiveDate,
    /// Destination CSV file
    #[arg(long)]
    pub file: PathBuf,
    /// Column compared against --to-date
    #[arg(long = "date-column", default_value = "to_date", value_parser = parse_identifier)]
    pub date_column: String,
    /// Sort columns (comma-separated)
    #[arg(
        long = "order-by",
        value_delimiter = ',',
        default_value = "ledger_account,characteristic",
        value_parser = parse_identifier
    )]
    pub order_by: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Table whose structure the import target copies, as schema.table
    #[arg(long, default_value = DEFAULT_EXCHANGE_TABLE, value_parser = parse_table_name)]
    pub table: QualifiedName,
    /// Source CSV file (comma-separated, header row)
    #[arg(long)]
    pub file: PathBuf,
    /// Target table (defaults to <table>_v2)
    #[arg(long, value_parser = parse_table_name)]
    pub target: Option<QualifiedName>,
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// YAML catalog to validate and print instead of the built-in one
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

pub fn parse_table_name(value: &str) -> Result<QualifiedName, String> {
    value.parse().map_err(|err: anyhow::Error| err.to_string())
}

pub fn parse_iso_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| format!("Expected YYYY-MM-DD, got '{value}': {err}"))
}

pub fn parse_identifier(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if crate::catalog::is_valid_identifier(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(format!("Invalid column name '{value}'"))
    }
}
