//! Destination table definitions.
//!
//! A [`TableSpec`] is the single source of truth for how one warehouse table
//! is loaded: the order of its `columns` is the write-template order, date
//! columns declare their incoming format, text columns may declare a maximum
//! length, and the write strategy plus primary key decide conflict handling.
//!
//! Specs come from [`Catalog::builtin`] or from a YAML catalog file loaded with
//! [`Catalog::load`]. Both paths go through [`TableSpec::validate`].

use std::{
    collections::HashSet,
    fmt,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LoadError, LoadResult},
    io_utils::DEFAULT_SOURCE_DELIMITER,
    strategy::WritePlan,
};

pub const DEFAULT_SCHEMA: &str = "public";
pub const BUILTIN_SCHEMA: &str = "ds";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

fn sql_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\(\s*\d+\s*(,\s*\d+\s*)?\))?$")
            .expect("valid sql type regex")
    })
}

pub fn is_valid_identifier(value: &str) -> bool {
    identifier_pattern().is_match(value)
}

/// `schema.table` pair; the schema defaults to `public` when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Same schema, name suffixed (e.g. `_v2` copy tables).
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self::new(self.schema.clone(), format!("{}{}", self.name, suffix))
    }
}

impl FromStr for QualifiedName {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let (schema, name) = match trimmed.split_once('.') {
            Some((schema, name)) => (schema, name),
            None => (DEFAULT_SCHEMA, trimmed),
        };
        for part in [schema, name] {
            if !is_valid_identifier(part) {
                return Err(anyhow!("Invalid table name '{value}'"));
            }
        }
        Ok(Self::new(schema, name))
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Incoming textual date layouts understood by the sanitizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    #[serde(rename = "DD.MM.YYYY")]
    DayDotMonthDotYear,
    #[serde(rename = "DD-MM-YYYY")]
    DayDashMonthDashYear,
    #[serde(rename = "DD/MM/YYYY")]
    DaySlashMonthSlashYear,
    #[serde(rename = "MM/DD/YYYY")]
    MonthSlashDaySlashYear,
    #[serde(rename = "YYYY-MM-DD")]
    Iso,
}

impl DateFormat {
    pub fn pattern(self) -> &'static str {
        match self {
            DateFormat::DayDotMonthDotYear => "%d.%m.%Y",
            DateFormat::DayDashMonthDashYear => "%d-%m-%Y",
            DateFormat::DaySlashMonthSlashYear => "%d/%m/%Y",
            DateFormat::MonthSlashDaySlashYear => "%m/%d/%Y",
            DateFormat::Iso => "%Y-%m-%d",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DateFormat::DayDotMonthDotYear => "DD.MM.YYYY",
            DateFormat::DayDashMonthDashYear => "DD-MM-YYYY",
            DateFormat::DaySlashMonthSlashYear => "DD/MM/YYYY",
            DateFormat::MonthSlashDaySlashYear => "MM/DD/YYYY",
            DateFormat::Iso => "YYYY-MM-DD",
        }
    }

    pub fn parse(self, value: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(value.trim(), self.pattern()).ok()
    }
}

impl FromStr for DateFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let upper = value.trim().to_ascii_uppercase();
        [
            DateFormat::DayDotMonthDotYear,
            DateFormat::DayDashMonthDashYear,
            DateFormat::DaySlashMonthSlashYear,
            DateFormat::MonthSlashDaySlashYear,
            DateFormat::Iso,
        ]
        .into_iter()
        .find(|format| format.label() == upper)
        .ok_or_else(|| anyhow!("Unsupported date format '{value}'"))
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    AppendSkip,
    Upsert,
    TruncateReload,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::AppendSkip => "append-skip",
            StrategyKind::Upsert => "upsert",
            StrategyKind::TruncateReload => "truncate-reload",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// PostgreSQL type used for DDL and for the parameter cast in the write template.
    pub sql_type: String,
    #[serde(default = "ColumnSpec::default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<DateFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            date_format: None,
            max_length: None,
        }
    }

    const fn default_nullable() -> bool {
        true
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn date(mut self, format: DateFormat) -> Self {
        self.date_format = Some(format);
        self
    }

    pub fn max_length(mut self, limit: usize) -> Self {
        self.max_length = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub table: QualifiedName,
    /// Source file name relative to the data directory; `<table>.csv` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default = "TableSpec::default_delimiter")]
    pub delimiter: char,
    pub strategy: StrategyKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnSpec>,
}

/// A source extract resolved against the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub table: QualifiedName,
    pub delimiter: u8,
}

impl TableSpec {
    pub fn new(table: QualifiedName, strategy: StrategyKind, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table,
            file: None,
            delimiter: DEFAULT_SOURCE_DELIMITER as char,
            strategy,
            primary_key: Vec::new(),
            columns,
        }
    }

    const fn default_delimiter() -> char {
        DEFAULT_SOURCE_DELIMITER as char
    }

    pub fn with_key(mut self, key: &[&str]) -> Self {
        self.primary_key = key.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn file_name(&self) -> String {
        self.file
            .clone()
            .unwrap_or_else(|| format!("{}.csv", self.table.name))
    }

    pub fn source_file(&self, data_dir: &Path) -> SourceFile {
        SourceFile {
            path: data_dir.join(self.file_name()),
            table: self.table.clone(),
            delimiter: self.delimiter as u8,
        }
    }

    /// Write-template order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    pub fn date_columns(&self) -> impl Iterator<Item = (&ColumnSpec, DateFormat)> {
        self.columns
            .iter()
            .filter_map(|c| c.date_format.map(|format| (c, format)))
    }

    pub fn length_limits(&self) -> impl Iterator<Item = (&ColumnSpec, usize)> {
        self.columns
            .iter()
            .filter_map(|c| c.max_length.map(|limit| (c, limit)))
    }

    pub fn validate(&self) -> LoadResult<()> {
        let table = self.table.to_string();
        let fail = |reason: String| Err(LoadError::invalid_spec(table.clone(), reason));

        if self.columns.is_empty() {
            return fail("no columns declared".into());
        }
        if !self.delimiter.is_ascii() {
            return fail(format!("delimiter '{}' is not ASCII", self.delimiter));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !is_valid_identifier(&column.name) {
                return fail(format!("invalid column name '{}'", column.name));
            }
            if !seen.insert(column.name.as_str()) {
                return fail(format!("column '{}' declared twice", column.name));
            }
            if !sql_type_pattern().is_match(column.sql_type.trim()) {
                return fail(format!(
                    "column '{}' has unsupported sql_type '{}'",
                    column.name, column.sql_type
                ));
            }
            if column.max_length == Some(0) {
                return fail(format!("column '{}' has max_length 0", column.name));
            }
        }
        for key in &self.primary_key {
            match self.column(key) {
                None => return fail(format!("primary key column '{key}' is not declared")),
                Some(column) if column.nullable => {
                    return fail(format!("primary key column '{key}' must be NOT NULL"));
                }
                Some(_) => {}
            }
        }
        WritePlan::resolve(self).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub tables: Vec<TableSpec>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening catalog file {path:?}"))?;
        let catalog: Catalog =
            serde_yaml::from_reader(BufReader::new(file)).context("Parsing catalog YAML")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let catalog: Catalog = serde_yaml::from_str(yaml).context("Parsing catalog YAML")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing catalog to YAML")
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for spec in &self.tables {
            spec.validate()?;
            if !names.insert(spec.table.to_string()) {
                return Err(anyhow!("Table {} is declared more than once", spec.table));
            }
        }
        Ok(())
    }

    /// Looks a table up by bare or schema-qualified name.
    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.tables
            .iter()
            .find(|spec| spec.table.name == name || spec.table.to_string() == name)
    }

    /// Restricts the catalog to `names`, keeping configured order. An empty
    /// selection means every table.
    pub fn select(&self, names: &[String]) -> Result<Vec<&TableSpec>> {
        if names.is_empty() {
            return Ok(self.tables.iter().collect());
        }
        if let Some(unknown) = names.iter().find(|name| self.get(name).is_none()) {
            return Err(anyhow!("Table '{unknown}' is not in the catalog"));
        }
        Ok(self
            .tables
            .iter()
            .filter(|spec| {
                names
                    .iter()
                    .any(|name| spec.table.name == *name || spec.table.to_string() == *name)
            })
            .collect())
    }

    /// The banking extract tables, in load order.
    pub fn builtin() -> Self {
        use DateFormat::*;
        use StrategyKind::*;

        let ds = |name: &str| QualifiedName::new(BUILTIN_SCHEMA, name);
        let tables = vec![
            TableSpec::new(
                ds("md_ledger_account_s"),
                AppendSkip,
                vec![
                    ColumnSpec::new("chapter", "char(1)"),
                    ColumnSpec::new("chapter_name", "varchar(16)"),
                    ColumnSpec::new("section_number", "integer"),
                    ColumnSpec::new("section_name", "varchar(22)"),
                    ColumnSpec::new("subsection_name", "varchar(21)"),
                    ColumnSpec::new("ledger1_account", "integer"),
                    ColumnSpec::new("ledger1_account_name", "varchar(47)"),
                    ColumnSpec::new("ledger_account", "integer").not_null(),
                    ColumnSpec::new("ledger_account_name", "varchar(153)"),
                    ColumnSpec::new("characteristic", "char(1)"),
                    ColumnSpec::new("start_date", "date").not_null(),
                    ColumnSpec::new("end_date", "date"),
                ],
            )
            .with_key(&["ledger_account", "start_date"]),
            TableSpec::new(
                ds("md_exchange_rate_d"),
                Upsert,
                vec![
                    ColumnSpec::new("data_actual_date", "date").not_null(),
                    ColumnSpec::new("data_actual_end_date", "date"),
                    ColumnSpec::new("currency_rk", "numeric").not_null(),
                    ColumnSpec::new("reduced_cource", "double precision"),
                    ColumnSpec::new("code_iso_num", "varchar(3)"),
                ],
            )
            .with_key(&["data_actual_date", "currency_rk"]),
            TableSpec::new(
                ds("ft_balance_f"),
                Upsert,
                vec![
                    ColumnSpec::new("on_date", "date")
                        .not_null()
                        .date(DayDotMonthDotYear),
                    ColumnSpec::new("account_rk", "numeric").not_null(),
                    ColumnSpec::new("currency_rk", "numeric"),
                    ColumnSpec::new("balance_out", "double precision"),
                ],
            )
            .with_key(&["on_date", "account_rk"]),
            TableSpec::new(
                ds("md_account_d"),
                Upsert,
                vec![
                    ColumnSpec::new("data_actual_date", "date").not_null(),
                    ColumnSpec::new("data_actual_end_date", "date").not_null(),
                    ColumnSpec::new("account_rk", "numeric").not_null(),
                    ColumnSpec::new("account_number", "varchar(20)").not_null(),
                    ColumnSpec::new("char_type", "varchar(1)").not_null(),
                    ColumnSpec::new("currency_rk", "numeric").not_null(),
                    ColumnSpec::new("currency_code", "varchar(3)").not_null(),
                ],
            )
            .with_key(&["data_actual_date", "account_rk"]),
            TableSpec::new(
                ds("md_currency_d"),
                Upsert,
                vec![
                    ColumnSpec::new("currency_rk", "numeric").not_null(),
                    ColumnSpec::new("data_actual_date", "date").not_null(),
                    ColumnSpec::new("data_actual_end_date", "date"),
                    ColumnSpec::new("currency_code", "varchar(3)").max_length(3),
                    ColumnSpec::new("code_iso_char", "varchar(3)").max_length(3),
                ],
            )
            .with_key(&["currency_rk", "data_actual_date"]),
            TableSpec::new(
                ds("ft_posting_f"),
                TruncateReload,
                vec![
                    ColumnSpec::new("oper_date", "date")
                        .not_null()
                        .date(DayDashMonthDashYear),
                    ColumnSpec::new("credit_account_rk", "numeric").not_null(),
                    ColumnSpec::new("debet_account_rk", "numeric").not_null(),
                    ColumnSpec::new("credit_amount", "double precision"),
                    ColumnSpec::new("debet_amount", "double precision"),
                ],
            ),
        ];
        Catalog { tables }
    }
}
