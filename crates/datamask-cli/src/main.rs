mod config;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use datamask_anonymize::{
    AnonymizeError, Anonymizer, Checker, ConnectionSet, Manager, RunReport, RunStatus,
};
use datamask_core::{ConnectionRole, Error as CoreError, RedactedConnection};
use datamask_postgres::PgStore;
use registry::{RunContext, RunPaths, init_run_logging, start_run, write_report};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{DatamaskConfig, config_schema};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("anonymize error: {0}")]
    Anonymize(#[from] AnonymizeError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("run {run_id} failed: {message}")]
    RunFailed { run_id: String, message: String },
}

#[derive(Parser, Debug)]
#[command(name = "datamask", version, about = "Datamask relational anonymizer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the destination schema, anonymize every table, run checks.
    Run(RunArgs),
    /// Reconcile the destination schema only.
    Reconcile(RunArgs),
    /// Compare one anonymized table against its source.
    Check(CheckArgs),
    /// Print the JSON Schema of the configuration file.
    ConfigSchema,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the TOML configuration.
    #[arg(long, short, value_name = "FILE")]
    config: PathBuf,
    /// Output directory for runs; overrides `run.run_dir`.
    #[arg(long)]
    run_dir: Option<PathBuf>,
    /// Seed for deterministic output; overrides `run.seed`.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[command(flatten)]
    run: RunArgs,
    /// Table to check.
    #[arg(long)]
    table: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run_anonymize(args).await,
        Command::Reconcile(args) => run_reconcile(args).await,
        Command::Check(args) => run_check(args).await,
        Command::ConfigSchema => {
            let schema = serde_json::to_string_pretty(&config_schema())
                .map_err(registry::RegistryError::from)?;
            println!("{schema}");
            Ok(())
        }
    }
}

/// Loaded configuration plus the opened run directory.
struct Session {
    run_id: String,
    config: DatamaskConfig,
    paths: RunPaths,
}

fn open_session(command: &str, args: &RunArgs) -> Result<Session, CliError> {
    let mut config = DatamaskConfig::load(&args.config)?;
    if let Some(run_dir) = &args.run_dir {
        config.run.run_dir = run_dir.clone();
    }
    if args.seed.is_some() {
        config.run.seed = args.seed;
    }

    let mut connections = Vec::new();
    for role in [
        ConnectionRole::Source,
        ConnectionRole::Destination,
        ConnectionRole::Catalog,
    ] {
        connections.push(RedactedConnection::from_config(
            role,
            config.connections.get(role)?,
        ));
    }

    let run_id = Uuid::new_v4().to_string();
    let ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        command: command.to_string(),
        run_dir: config.run.run_dir.clone(),
        settings: config.run.clone(),
        tables: config.tables.iter().map(|table| table.name.clone()).collect(),
        connections,
    };
    let paths = start_run(&ctx)?;
    init_run_logging(&paths.logs_path)?;
    tracing::info!(
        run_id = %run_id,
        command,
        run_root = %paths.root.display(),
        "run_directory_created"
    );

    Ok(Session {
        run_id,
        config,
        paths,
    })
}

async fn connect(config: &DatamaskConfig) -> Result<ConnectionSet, CliError> {
    let connections = &config.connections;
    let source =
        PgStore::connect(ConnectionRole::Source, connections.get(ConnectionRole::Source)?).await?;
    let destination = PgStore::connect(
        ConnectionRole::Destination,
        connections.get(ConnectionRole::Destination)?,
    )
    .await?;
    let catalog =
        PgStore::connect(ConnectionRole::Catalog, connections.get(ConnectionRole::Catalog)?)
            .await?;
    Ok(ConnectionSet {
        source: Arc::new(source),
        destination: Arc::new(destination),
        catalog: Arc::new(catalog),
    })
}

fn build_manager(session: &Session, connections: ConnectionSet) -> Result<Manager, CliError> {
    let settings = &session.config.run;
    let mut manager = Manager::new(connections)
        .with_run_id(session.run_id.clone())
        .with_seed(settings.seed)
        .with_schema_reconciliation(settings.reconcile_schema)
        .with_failure_policy(settings.on_failure);
    for table in &session.config.tables {
        manager.table(&table.name, |anonymizer| table.apply(anonymizer))?;
    }
    Ok(manager)
}

async fn run_anonymize(args: RunArgs) -> Result<(), CliError> {
    let session = open_session("run", &args)?;
    let connections = connect(&session.config).await?;
    let mut manager = build_manager(&session, connections)?;

    let report = manager.run().await;
    write_report(&session.paths, &report)?;
    print_summary(&report);

    if report.status == RunStatus::Failed {
        return Err(CliError::RunFailed {
            run_id: report.run_id,
            message: report.error.unwrap_or_default(),
        });
    }
    Ok(())
}

async fn run_reconcile(args: RunArgs) -> Result<(), CliError> {
    let session = open_session("reconcile", &args)?;
    let connections = connect(&session.config).await?;
    let mut manager = build_manager(&session, connections)?;

    let report = manager.reconcile_schema().await?;
    write_report(&session.paths, &report)?;
    println!(
        "kept: {:?}\ncreated: {:?}\nrecreated: {:?}\nskipped: {:?}",
        report.kept, report.created, report.recreated, report.skipped
    );
    Ok(())
}

async fn run_check(args: CheckArgs) -> Result<(), CliError> {
    let session = open_session("check", &args.run)?;
    let table = session.config.table(&args.table)?;
    let mut anonymizer = Anonymizer::new(&table.name);
    table.apply(&mut anonymizer);
    let columns = anonymizer.columns_eligible_for_check()?;

    let connections = connect(&session.config).await?;
    let mut checker = Checker::new(connections.source, connections.destination);
    checker
        .set_table_name(&table.name)
        .set_comparable_columns(columns);
    let report = checker.check().await?;
    write_report(&session.paths, &report)?;
    for message in &report.messages {
        println!("{message}");
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    for table in &report.tables {
        println!(
            "{}: {:?}, {} chunks, {} rows written in {} ms",
            table.table, table.write_mode, table.chunks, table.rows_written, table.duration_ms
        );
    }
    for check in &report.checks {
        println!(
            "{}: {} duplicates across {:?}",
            check.table, check.duplicate_count, check.comparable_columns
        );
    }
    if !report.abandoned.is_empty() {
        println!("abandoned: {}", report.abandoned.join(", "));
    }
    if !report.rolled_back.is_empty() {
        println!("truncated after failure: {}", report.rolled_back.join(", "));
    }
    if !report.not_rolled_back.is_empty() {
        println!("written rows kept: {}", report.not_rolled_back.join(", "));
    }
    println!(
        "run {} {:?} in {} ms",
        report.run_id, report.status, report.duration_ms
    );
}
