//! PostgreSQL backend over a single blocking connection.

use std::io::{self, Read, Write};

use itertools::Itertools;
use log::debug;
use postgres::{Client, NoTls, Row, types::ToSql};

use super::{ExportRequest, ImportRequest, Warehouse, WriteOutcome};
use crate::{
    catalog::{QualifiedName, TableSpec},
    error::StoreError,
    io_utils::{DEFAULT_EXCHANGE_DELIMITER, open_csv_reader},
    reconcile::CleanBatch,
    run_log::{RunRecord, RunStatus},
    strategy::WritePlan,
};

const RUN_COLUMNS: &str =
    "run_id, dag_id, task_id, started_at, finished_at, status, rows_loaded, note";

pub struct PostgresWarehouse {
    client: Client,
    run_log: QualifiedName,
}

impl PostgresWarehouse {
    pub fn connect(config: &postgres::Config, run_log: QualifiedName) -> Result<Self, StoreError> {
        let client = config
            .connect(NoTls)
            .map_err(|err| StoreError::Connection(err.to_string()))?;
        Ok(Self { client, run_log })
    }

    fn row_to_run(row: &Row) -> Result<RunRecord, StoreError> {
        let status: String = row.try_get("status")?;
        Ok(RunRecord {
            run_id: row.try_get("run_id")?,
            process_id: row.try_get("dag_id")?,
            task_id: row.try_get("task_id")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            status: status
                .parse()
                .map_err(|err: anyhow::Error| StoreError::Query(err.to_string()))?,
            rows_loaded: row.try_get("rows_loaded")?,
            note: row.try_get("note")?,
        })
    }
}

pub fn create_table_sql(spec: &TableSpec) -> String {
    let mut definitions = spec
        .columns
        .iter()
        .map(|c| {
            let null = if c.nullable { "" } else { " NOT NULL" };
            format!("{} {}{null}", c.name, c.sql_type.trim())
        })
        .collect::<Vec<_>>();
    if !spec.primary_key.is_empty() {
        definitions.push(format!("PRIMARY KEY ({})", spec.primary_key.join(", ")));
    }
    format!(
        "CREATE SCHEMA IF NOT EXISTS {schema}; CREATE TABLE IF NOT EXISTS {table} ({columns})",
        schema = spec.table.schema,
        table = spec.table,
        columns = definitions.join(", ")
    )
}

pub fn create_run_log_sql(table: &QualifiedName) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {schema}; \
         CREATE TABLE IF NOT EXISTS {table} (\
         run_id bigserial PRIMARY KEY, \
         dag_id text NOT NULL, \
         task_id text NOT NULL, \
         started_at timestamptz NOT NULL DEFAULT clock_timestamp(), \
         finished_at timestamptz, \
         status text NOT NULL, \
         rows_loaded bigint, \
         note text)",
        schema = table.schema
    )
}

pub fn export_sql(request: &ExportRequest) -> String {
    let order = if request.order_by.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", request.order_by.iter().join(", "))
    };
    format!(
        "COPY (SELECT * FROM {table} WHERE {column} = DATE '{date}'{order}) \
         TO STDOUT WITH (FORMAT csv, HEADER)",
        table = request.table,
        column = request.date_column,
        date = request.to_date.format("%Y-%m-%d"),
    )
}

/// Integrity-constraint violations (SQLSTATE class 23) are reported as such.
fn write_error(err: postgres::Error, table: &QualifiedName) -> StoreError {
    match err.as_db_error() {
        Some(db) if db.code().code().starts_with("23") => StoreError::Constraint {
            table: table.to_string(),
            message: db.message().to_string(),
        },
        _ => StoreError::from(err),
    }
}

impl Warehouse for PostgresWarehouse {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn ensure_run_log(&mut self) -> Result<(), StoreError> {
        self.client
            .batch_execute(&create_run_log_sql(&self.run_log))?;
        Ok(())
    }

    fn insert_run(
        &mut self,
        process_id: &str,
        task_id: &str,
        note: Option<&str>,
    ) -> Result<RunRecord, StoreError> {
        let sql = format!(
            "INSERT INTO {} (dag_id, task_id, started_at, status, note) \
             VALUES ($1, $2, clock_timestamp(), $3, $4) RETURNING {RUN_COLUMNS}",
            self.run_log
        );
        let row = self.client.query_one(
            sql.as_str(),
            &[&process_id, &task_id, &RunStatus::Running.as_str(), &note],
        )?;
        Self::row_to_run(&row)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        rows_loaded: Option<i64>,
        note: Option<&str>,
    ) -> Result<RunRecord, StoreError> {
        let sql = format!(
            "UPDATE {} SET finished_at = clock_timestamp(), status = $1, \
             rows_loaded = COALESCE($2, rows_loaded), note = COALESCE($3, note) \
             WHERE run_id = $4 AND finished_at IS NULL RETURNING {RUN_COLUMNS}",
            self.run_log
        );
        let updated = self
            .client
            .query_opt(sql.as_str(), &[&status.as_str(), &rows_loaded, &note, &run_id])?;
        if let Some(row) = updated {
            return Self::row_to_run(&row);
        }
        let probe = format!("SELECT 1 FROM {} WHERE run_id = $1", self.run_log);
        let exists = self.client.query_opt(probe.as_str(), &[&run_id])?;
        Err(match exists {
            Some(_) => StoreError::RunAlreadyFinished(run_id),
            None => StoreError::UnknownRun(run_id),
        })
    }

    fn ensure_table(&mut self, spec: &TableSpec) -> Result<(), StoreError> {
        self.client.batch_execute(&create_table_sql(spec))?;
        Ok(())
    }

    fn write_batch(
        &mut self,
        spec: &TableSpec,
        plan: &WritePlan,
        batch: &CleanBatch,
    ) -> Result<WriteOutcome, StoreError> {
        let template = plan.write_template(spec);
        debug!("{}: {}", spec.table, template);

        let mut tx = self.client.transaction()?;
        if plan.truncates_first() {
            tx.batch_execute(&format!("TRUNCATE TABLE {}", spec.table))
                .map_err(|err| write_error(err, &spec.table))?;
        }
        let statement = tx
            .prepare(&template)
            .map_err(|err| write_error(err, &spec.table))?;
        let mut outcome = WriteOutcome::default();
        for row in &batch.rows {
            let params: Vec<&(dyn ToSql + Sync)> =
                row.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            outcome.affected += tx
                .execute(&statement, &params)
                .map_err(|err| write_error(err, &spec.table))?;
            outcome.attempted += 1;
        }
        tx.commit().map_err(|err| write_error(err, &spec.table))?;
        Ok(outcome)
    }

    fn export_csv(
        &mut self,
        request: &ExportRequest,
        out: &mut dyn Write,
    ) -> Result<u64, StoreError> {
        let sql = export_sql(request);
        debug!("{sql}");
        let mut buffer = Vec::new();
        self.client.copy_out(sql.as_str())?.read_to_end(&mut buffer)?;

        let mut reader = open_csv_reader(buffer.as_slice(), DEFAULT_EXCHANGE_DELIMITER, true);
        let mut count = 0u64;
        for record in reader.records() {
            record?;
            count += 1;
        }
        out.write_all(&buffer)?;
        out.flush()?;
        Ok(count)
    }

    fn import_csv(
        &mut self,
        request: &ImportRequest,
        input: &mut dyn Read,
    ) -> Result<u64, StoreError> {
        let mut tx = self.client.transaction()?;
        tx.batch_execute(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema}; \
             CREATE TABLE IF NOT EXISTS {target} (LIKE {source} INCLUDING ALL); \
             TRUNCATE TABLE {target}",
            schema = request.target.schema,
            target = request.target,
            source = request.source,
        ))?;
        let copy = format!(
            "COPY {} FROM STDIN WITH (FORMAT csv, HEADER)",
            request.target
        );
        let mut writer = tx.copy_in(copy.as_str())?;
        io::copy(input, &mut writer)?;
        writer
            .finish()
            .map_err(|err| write_error(err, &request.target))?;
        let count_sql = format!("SELECT COUNT(*) FROM {}", request.target);
        let count: i64 = tx.query_one(count_sql.as_str(), &[])?.try_get(0)?;
        tx.commit()?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use chrono::NaiveDate;

    #[test]
    fn create_table_sql_includes_constraints() {
        let catalog = Catalog::builtin();
        let sql = create_table_sql(catalog.get("md_currency_d").unwrap());
        assert!(sql.starts_with("CREATE SCHEMA IF NOT EXISTS ds;"));
        assert!(sql.contains("currency_rk numeric NOT NULL"));
        assert!(sql.contains("code_iso_char varchar(3)"));
        assert!(sql.ends_with("PRIMARY KEY (currency_rk, data_actual_date))"));
    }

    #[test]
    fn truncate_table_has_no_primary_key_clause() {
        let catalog = Catalog::builtin();
        let sql = create_table_sql(catalog.get("ft_posting_f").unwrap());
        assert!(!sql.contains("PRIMARY KEY"));
    }

    #[test]
    fn export_sql_filters_and_orders() {
        let request = ExportRequest {
            table: "dm.dm_f101_round_f".parse().unwrap(),
            date_column: "to_date".into(),
            to_date: NaiveDate::from_ymd_opt(2018, 1, 31).unwrap(),
            order_by: vec!["ledger_account".into(), "characteristic".into()],
        };
        assert_eq!(
            export_sql(&request),
            "COPY (SELECT * FROM dm.dm_f101_round_f WHERE to_date = DATE '2018-01-31' \
             ORDER BY ledger_account, characteristic) TO STDOUT WITH (FORMAT csv, HEADER)"
        );
    }

    #[test]
    fn run_log_ddl_uses_configured_table() {
        let sql = create_run_log_sql(&"logs.etl_runs".parse().unwrap());
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS logs.etl_runs ("));
        assert!(sql.contains("rows_loaded bigint"));
    }
}
