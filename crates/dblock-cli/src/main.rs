// crates/dblock-cli/src/main.rs
// ============================================================================
// Module: dblock CLI Entry Point
// Description: Command dispatcher for lock correctness runs.
// Purpose: Load config, apply overrides, run the harness, and report findings.
// Dependencies: clap, dblock-config, dblock-core, dblock-store-*, serde_json, thiserror.
// ============================================================================

//! ## Overview
//! `dblock run` wires the configured lock variant and store backend into the
//! harness and prints the elapsed time and findings. The exit code is 0 for
//! a clean run, 2 when the run found violations or unlock anomalies, and 1
//! when the run could not complete.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use dblock_config::DblockConfig;
use dblock_config::LogSink;
use dblock_config::LoggingConfig;
use dblock_config::StoreConfig;
use dblock_core::FileEventSink;
use dblock_core::HarnessEventSink;
use dblock_core::LockVariant;
use dblock_core::NoopEventSink;
use dblock_core::ResourceFactory;
use dblock_core::RunReport;
use dblock_core::StderrEventSink;
use dblock_core::TestHarness;
use dblock_store_postgres::PostgresResourceConfig;
use dblock_store_postgres::PostgresResourceFactory;
use dblock_store_sqlite::SqliteResourceConfig;
use dblock_store_sqlite::SqliteResourceFactory;
use thiserror::Error;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Exit status for a run that completed with findings.
const EXIT_FINDINGS: u8 = 2;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "dblock", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lock variant against a store with concurrent workers.
    Run(RunCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a dblock configuration file.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Config file path (defaults to `DBLOCK_CONFIG` or `./dblock.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `run`.
#[derive(Args, Debug, Default)]
struct RunCommand {
    /// Config file path (defaults to `DBLOCK_CONFIG` or `./dblock.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Lock variant under test.
    #[arg(long, value_enum)]
    variant: Option<VariantArg>,
    /// Number of concurrent workers.
    #[arg(long, value_name = "N")]
    workers: Option<u32>,
    /// Released cycles per worker.
    #[arg(long, value_name = "N")]
    quota: Option<u32>,
    /// Run against a `SQLite` database file.
    #[arg(long, value_name = "PATH", conflicts_with = "postgres")]
    sqlite_path: Option<PathBuf>,
    /// Run against a `PostgreSQL` connection string.
    #[arg(long, value_name = "URL")]
    postgres: Option<String>,
    /// Report format.
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,
}

/// Lock variant selection.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
enum VariantArg {
    /// Unique-key insert on a single row.
    Insert,
    /// Unique-key insert on one row per parity domain.
    PartitionedInsert,
    /// Guarded update of a seeded row.
    ConditionalUpdate,
}

impl From<VariantArg> for LockVariant {
    fn from(value: VariantArg) -> Self {
        match value {
            VariantArg::Insert => Self::Insert,
            VariantArg::PartitionedInsert => Self::PartitionedInsert,
            VariantArg::ConditionalUpdate => Self::ConditionalUpdate,
        }
    }
}

/// Report format selection.
#[derive(ValueEnum, Copy, Clone, Debug, Default, PartialEq, Eq)]
enum FormatArg {
    /// Human-readable summary.
    #[default]
    Text,
    /// Serialized run report.
    Json,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures; every variant maps to exit status 1.
#[derive(Debug, Error)]
enum CliError {
    /// Config could not be loaded or overrides are invalid.
    #[error("{0}")]
    Config(#[from] dblock_config::ConfigError),
    /// Store backend could not be prepared.
    #[error("store setup failed: {0}")]
    Store(String),
    /// Event sink could not be opened.
    #[error("event log setup failed: {0}")]
    Logging(String),
    /// The run aborted.
    #[error("run failed: {0}")]
    Run(#[from] dblock_core::HarnessError),
    /// Output could not be written.
    #[error("failed to write {stream}: {error}")]
    Output {
        /// Stream name.
        stream: &'static str,
        /// Underlying I/O error.
        error: std::io::Error,
    },
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(command) => command_run(&command),
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(command) => command_config_validate(&command),
        },
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `config validate`.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let config = DblockConfig::load(command.config.as_deref())?;
    let table = config.lock_table()?;
    write_stdout_line(&format!(
        "config ok: variant={} table={} store={}",
        config.run.variant,
        table,
        config.store.dialect().as_str()
    ))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `run`.
fn command_run(command: &RunCommand) -> CliResult<ExitCode> {
    let mut config = DblockConfig::load_or_default(command.config.as_deref())?;
    apply_overrides(&mut config, command)?;

    let table = config.lock_table()?;
    let strategy = config.run.variant.build(table, config.store.dialect());
    let factory = build_factory(&config.store)?;
    let sink = build_sink(&config.logging)?;
    let harness =
        TestHarness::new(config.harness_config(), factory.as_ref(), strategy.as_ref(), sink.as_ref());
    let report = harness.run()?;

    match command.format {
        FormatArg::Text => {
            for line in render_text(&report) {
                write_stdout_line(&line)?;
            }
        }
        FormatArg::Json => {
            let payload = serde_json::to_string_pretty(&report)
                .map_err(|err| CliError::Output {
                    stream: "stdout",
                    error: std::io::Error::other(err),
                })?;
            write_stdout_line(&payload)?;
        }
    }
    Ok(ExitCode::from(exit_status(&report)))
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

/// Applies command-line overrides and revalidates the result.
fn apply_overrides(config: &mut DblockConfig, command: &RunCommand) -> CliResult<()> {
    if let Some(variant) = command.variant {
        config.run.variant = variant.into();
    }
    if let Some(workers) = command.workers {
        config.run.workers = workers;
    }
    if let Some(quota) = command.quota {
        config.run.quota = quota;
    }
    if let Some(path) = &command.sqlite_path {
        match &mut config.store {
            StoreConfig::Sqlite(sqlite) => sqlite.path.clone_from(path),
            StoreConfig::Postgres(_) => {
                config.store = StoreConfig::Sqlite(SqliteResourceConfig::new(path.clone()));
            }
        }
    }
    if let Some(connection) = &command.postgres {
        match &mut config.store {
            StoreConfig::Postgres(postgres) => postgres.connection.clone_from(connection),
            StoreConfig::Sqlite(_) => {
                config.store =
                    StoreConfig::Postgres(PostgresResourceConfig::new(connection.clone()));
            }
        }
    }
    config.validate()?;
    Ok(())
}

/// Builds the resource factory for the configured backend.
fn build_factory(store: &StoreConfig) -> CliResult<Box<dyn ResourceFactory>> {
    match store {
        StoreConfig::Sqlite(config) => SqliteResourceFactory::new(config.clone())
            .map(|factory| Box::new(factory) as Box<dyn ResourceFactory>)
            .map_err(|err| CliError::Store(err.to_string())),
        StoreConfig::Postgres(config) => PostgresResourceFactory::new(config.clone())
            .map(|factory| Box::new(factory) as Box<dyn ResourceFactory>)
            .map_err(|err| CliError::Store(err.to_string())),
    }
}

/// Builds the event sink for the configured destination.
fn build_sink(logging: &LoggingConfig) -> CliResult<Box<dyn HarnessEventSink>> {
    match (logging.sink, &logging.path) {
        (LogSink::Stderr, _) => Ok(Box::new(StderrEventSink::new(logging.level))),
        (LogSink::File, Some(path)) => FileEventSink::new(path, logging.level)
            .map(|sink| Box::new(sink) as Box<dyn HarnessEventSink>)
            .map_err(|err| CliError::Logging(format!("{}: {err}", path.display()))),
        (LogSink::File, None) => {
            Err(CliError::Logging("logging.path is required for the file sink".to_string()))
        }
        (LogSink::None, _) => Ok(Box::new(NoopEventSink)),
    }
}

// ============================================================================
// SECTION: Reporting
// ============================================================================

/// Maps a completed run to its exit status.
fn exit_status(report: &RunReport) -> u8 {
    if report.is_clean() { 0 } else { EXIT_FINDINGS }
}

/// Renders the text summary of a run.
fn render_text(report: &RunReport) -> Vec<String> {
    let mut lines = vec![
        format!("Time taken = {} ms", report.elapsed_ms),
        format!(
            "variant={} table={} workers={} quota={}",
            report.variant, report.table, report.workers, report.quota
        ),
        format!(
            "cycles={} violations={} unlock_failures={} residual_holders={}",
            report.total_cycles(),
            report.total_violations(),
            report.total_unlock_failures(),
            report.residual_holders
        ),
    ];
    for domain in &report.domains {
        lines.push(format!(
            "domain {}: entries={} peak_holders={} final_holders={}",
            domain.domain, domain.entries, domain.peak_holders, domain.final_holders
        ));
    }
    lines.push(if report.is_clean() {
        "result: clean".to_string()
    } else {
        "result: findings detected".to_string()
    });
    lines
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|error| CliError::Output {
        stream: "stdout",
        error,
    })
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
