pub mod catalog;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod exchange;
pub mod io_utils;
pub mod pipeline;
pub mod reconcile;
pub mod run_log;
pub mod sanitize;
pub mod store;
pub mod strategy;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    catalog::Catalog,
    cli::{CatalogArgs, Cli, Commands, ExportArgs, ImportArgs, LoadArgs},
    config::LoaderConfig,
    pipeline::Orchestrator,
    run_log::RunLogger,
    store::{ExportRequest, ImportRequest, MemoryWarehouse, PostgresWarehouse, Warehouse},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("warehouse_loader", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    // A missing .env file is not an error; real environment variables win.
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => handle_load(&args),
        Commands::Export(args) => handle_export(&args),
        Commands::Import(args) => handle_import(&args),
        Commands::Catalog(args) => handle_catalog(&args),
    }
}

fn load_catalog(path: Option<&std::path::Path>) -> Result<Catalog> {
    match path {
        Some(path) => {
            Catalog::load(path).with_context(|| format!("Loading catalog from {path:?}"))
        }
        None => Ok(Catalog::builtin()),
    }
}

fn connect(config: &LoaderConfig) -> Result<PostgresWarehouse> {
    info!("Connecting to {}", config.db.masked());
    PostgresWarehouse::connect(&config.db.pg_config(), config.run_log_table.clone())
        .with_context(|| format!("Connecting to {}", config.db.masked()))
}

fn handle_load(args: &LoadArgs) -> Result<()> {
    let mut config = LoaderConfig::from_env()?;
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    config.catalog = load_catalog(args.catalog.as_deref())?;
    let tables = config.catalog.select(&args.tables)?;
    debug!(
        "Selected tables: {:?}",
        tables.iter().map(|t| t.table.to_string()).collect::<Vec<_>>()
    );

    let mut store: Box<dyn Warehouse> = if args.dry_run {
        info!("Dry run: writing to an in-memory warehouse");
        Box::new(MemoryWarehouse::new())
    } else {
        Box::new(connect(&config)?)
    };

    let orchestrator = Orchestrator::new(&config);
    let summary = orchestrator
        .run(store.as_mut(), &tables)
        .with_context(|| format!("Loading extracts from {:?}", config.data_dir))?;

    if args.json {
        let json = serde_json::to_string_pretty(&summary).context("Serializing run summary")?;
        println!("{json}");
    } else {
        print!("{}", table::render_run_summary(&summary));
    }
    info!(
        "Run {} finished: {} row(s) across {} table(s)",
        summary.run.run_id,
        summary.rows_loaded(),
        summary.tables.len()
    );
    Ok(())
}

fn handle_export(args: &ExportArgs) -> Result<()> {
    let config = LoaderConfig::from_env()?;
    let mut store = connect(&config)?;
    let logger = RunLogger::new(config.process_id.clone(), exchange::EXPORT_TASK_ID);
    let request = ExportRequest {
        table: args.table.clone(),
        date_column: args.date_column.clone(),
        to_date: args.to_date,
        order_by: args.order_by.clone(),
    };
    let count = exchange::export_table(&mut store, &logger, &request, &args.file)?;
    println!("{count}");
    Ok(())
}

fn handle_import(args: &ImportArgs) -> Result<()> {
    let config = LoaderConfig::from_env()?;
    let mut store = connect(&config)?;
    let logger = RunLogger::new(config.process_id.clone(), exchange::IMPORT_TASK_ID);
    let request = ImportRequest {
        source: args.table.clone(),
        target: args
            .target
            .clone()
            .unwrap_or_else(|| args.table.with_suffix("_v2")),
    };
    let count = exchange::import_table(&mut store, &logger, &request, &args.file)?;
    println!("{count}");
    Ok(())
}

fn handle_catalog(args: &CatalogArgs) -> Result<()> {
    let catalog = load_catalog(args.catalog.as_deref())?;
    catalog.validate()?;
    print!("{}", catalog.to_yaml_string()?);
    Ok(())
}
