//! table-migrate CLI - copy one PostgreSQL table into another.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use table_migrate::{
    AutoConfirm, Config, ExecutionMode, JsonProgress, LogProgress, MigrateError, MigrationResult,
    Orchestrator,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "table-migrate")]
#[command(about = "Copy a table between PostgreSQL databases in batches")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the source table into the destination table
    Run {
        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Keep existing destination rows instead of clearing them
        #[arg(long)]
        append: bool,

        /// Write batches concurrently, one writer per destination connection
        #[arg(long)]
        multithreaded: bool,

        /// Skip the large-table confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Validate both tables and count source rows without copying
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            batch_size,
            append,
            multithreaded,
            yes,
        } => {
            // Apply overrides
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            config.migration.append |= append;
            config.migration.multithreaded |= multithreaded;
            config.validate()?;

            let cancel_token = setup_signal_handler();
            let mode = ExecutionMode::from_multithreaded(config.migration.multithreaded);

            let mut orchestrator = Orchestrator::connect(&config).await?;
            if yes {
                orchestrator = orchestrator.with_confirmation(Arc::new(AutoConfirm));
            }
            orchestrator = if cli.progress {
                orchestrator.with_progress(Arc::new(JsonProgress::stderr()))
            } else {
                orchestrator.with_progress(Arc::new(LogProgress::default()))
            };

            let result = orchestrator.run(mode, cancel_token).await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_summary(&result);
            }
            Ok(result.exit_code())
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::connect(&config).await?;
            let report = orchestrator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Validation completed successfully");
                println!(
                    "  Source: {} ({} columns, {} rows)",
                    report.source.full_name(),
                    report.source.columns.len(),
                    report.source_rows
                );
                println!(
                    "  Destination: {} ({} columns)",
                    report.destination.full_name(),
                    report.destination.columns.len()
                );
                if report.requires_confirmation {
                    println!("  Large table: `run` will ask for confirmation (use --yes to skip)");
                }
            }
            Ok(0)
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::connect(&config).await?;
            let result = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source: {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Destination: {} ({}ms)",
                    if result.destination_connected { "OK" } else { "FAILED" },
                    result.destination_latency_ms
                );
                if let Some(ref err) = result.destination_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "health check failed",
                    "checking source and destination catalogs",
                ));
            }
            Ok(0)
        }
    }
}

fn print_summary(result: &MigrationResult) {
    if result.success {
        println!("\nMigration completed!");
    } else {
        println!("\nMigration failed!");
    }
    println!("  Run ID: {}", result.run_id);
    println!("  {} -> {}", result.source_table, result.destination_table);
    println!(
        "  Duration: {:.2}s (copy {:.2}s)",
        result.elapsed_ms as f64 / 1000.0,
        result.copy_elapsed_ms as f64 / 1000.0
    );
    match result.rows_expected {
        Some(expected) => println!("  Rows: {}/{}", result.rows_migrated, expected),
        None => println!("  Rows: {}", result.rows_migrated),
    }
    println!("  Batches: {}", result.batches);
    println!("  Throughput: {} rows/sec", result.rows_per_second);
    if let Some(ref failure) = result.failure {
        println!("  Error: {}", failure.message);
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json keeps stdout clean
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// Cancellation stops extraction and aborts outstanding batch writes; rows
/// already committed stay in the destination.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Stopping migration...", name);
            token.cancel();
        });
    }

    cancel_token
}

/// Ctrl-C only on platforms without Unix signals.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Stopping migration...");
        token.cancel();
    });

    cancel_token
}
