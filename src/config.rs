//! Process configuration.
//!
//! [`LoaderConfig`] is assembled once at start-up from the environment (after
//! `.env` has been loaded) and the command line, then passed by reference to
//! whatever needs it. Nothing reads the environment after that point.

use std::{env, fmt, path::PathBuf};

use anyhow::{Context, Result};

use crate::catalog::{Catalog, QualifiedName};

pub const ENV_DB_HOST: &str = "DB_HOST";
pub const ENV_DB_PORT: &str = "DB_PORT";
pub const ENV_DB_NAME: &str = "DB_NAME";
pub const ENV_DB_USER: &str = "DB_USER";
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_DATA_DIR: &str = "LOADER_DATA_DIR";
pub const ENV_RUN_LOG_TABLE: &str = "LOADER_RUN_LOG_TABLE";
pub const ENV_PROCESS_ID: &str = "LOADER_PROCESS_ID";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_RUN_LOG_TABLE: &str = "logs.etl_runs";
pub const DEFAULT_PROCESS_ID: &str = "csv_loader";

#[derive(Clone, PartialEq, Eq)]
pub struct DbParams {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl Default for DbParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl DbParams {
    pub fn pg_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname)
            .user(&self.user);
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        config
    }

    /// Connection description safe for logs.
    pub fn masked(&self) -> String {
        let password = if self.password.is_empty() { "" } else { ":****" };
        format!(
            "postgres://{}{password}@{}:{}/{}",
            self.user, self.host, self.port, self.dbname
        )
    }
}

impl fmt::Debug for DbParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub db: DbParams,
    pub data_dir: PathBuf,
    pub run_log_table: QualifiedName,
    pub process_id: String,
    pub catalog: Catalog,
}

impl LoaderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; unset or blank keys fall
    /// back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = DbParams::default();
        let port = match get(ENV_DB_PORT) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("{ENV_DB_PORT} must be a port number, got '{value}'"))?,
            None => defaults.port,
        };
        let db = DbParams {
            host: get(ENV_DB_HOST).unwrap_or(defaults.host),
            port,
            dbname: get(ENV_DB_NAME).unwrap_or(defaults.dbname),
            user: get(ENV_DB_USER).unwrap_or(defaults.user),
            password: lookup(ENV_DB_PASSWORD).unwrap_or(defaults.password),
        };
        let run_log_table = get(ENV_RUN_LOG_TABLE)
            .unwrap_or_else(|| DEFAULT_RUN_LOG_TABLE.to_string())
            .parse::<QualifiedName>()
            .with_context(|| format!("Parsing {ENV_RUN_LOG_TABLE}"))?;
        Ok(Self {
            db,
            data_dir: get(ENV_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            run_log_table,
            process_id: get(ENV_PROCESS_ID).unwrap_or_else(|| DEFAULT_PROCESS_ID.to_string()),
            catalog: Catalog::builtin(),
        })
    }
}
