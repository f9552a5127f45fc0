//! pg-migrate-verify CLI - row-level verification of a PostgreSQL migration.

use clap::{Parser, Subcommand};
use pg_migrate_verify::error::{EXIT_DISCREPANCIES, EXIT_SOURCE_ERROR};
use pg_migrate_verify::{
    render_summary, Config, HealthStatus, PostgresChunkSource, ReportWriter, Side, VerifyEngine,
    VerifyError,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "pg-migrate-verify")]
#[command(about = "Row-level verification of a PostgreSQL migration")]
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

    /// Timeout in seconds for graceful shutdown (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a table between source_a and source_b row by row
    Verify {
        /// Table to verify (overrides verify.table)
        #[arg(long)]
        table: Option<String>,

        /// Rows fetched per chunk from each side (overrides verify.chunk_size)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Directory for report files (overrides verify.report_dir)
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Skip writing report files
        #[arg(long)]
        no_report: bool,
    },

    /// Test database connections
    HealthCheck,
}

#[derive(Serialize)]
struct HealthCheckResult {
    healthy: bool,
    source_a: HealthStatus,
    source_b: HealthStatus,
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

async fn run() -> Result<u8, VerifyError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
    let cancel_token = setup_signal_handler(cli.shutdown_timeout).await?;

    match cli.command {
        Commands::Verify {
            table,
            chunk_size,
            report_dir,
            no_report,
        } => {
            // Apply overrides
            if let Some(t) = table {
                config.verify.table = Some(t);
            }
            if let Some(n) = chunk_size {
                config.verify.chunk_size = n;
            }
            if let Some(dir) = report_dir {
                config.verify.report_dir = dir.to_string_lossy().into_owned();
            }
            config.validate()?;

            let (mut source_a, mut source_b) = tokio::try_join!(
                PostgresChunkSource::connect(Side::A, &config.source_a, &config.verify),
                PostgresChunkSource::connect(Side::B, &config.source_b, &config.verify),
            )?;

            let table = resolve_table(&config, &source_a, &source_b).await?;
            source_a.set_table(table.clone());
            source_b.set_table(table.clone());

            let mut engine = VerifyEngine::new(source_a, source_b)
                .with_table_name(table)
                .with_config_hash(config.hash());

            // Enable progress reporting if requested
            let progress_task = if cli.progress {
                let (tx, mut rx) = mpsc::channel(64);
                engine = engine.with_progress(tx);
                Some(tokio::spawn(async move {
                    while let Some(update) = rx.recv().await {
                        if let Ok(line) = serde_json::to_string(&update) {
                            eprintln!("{}", line);
                        }
                    }
                }))
            } else {
                None
            };

            let result = engine.run(cancel_token).await;
            if let Some(handle) = progress_task {
                let _ = handle.await;
            }
            let report = result?;

            if !no_report {
                let paths = ReportWriter::new(&config.verify.report_dir).write(&report)?;
                for path in &paths {
                    info!("Report file: {}", path.display());
                }
            }

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\n{}", render_summary(&report));
            }

            Ok(if report.is_clean() { 0 } else { EXIT_DISCREPANCIES })
        }

        Commands::HealthCheck => {
            let (a, b) = tokio::join!(
                PostgresChunkSource::connect(Side::A, &config.source_a, &config.verify),
                PostgresChunkSource::connect(Side::B, &config.source_b, &config.verify),
            );
            let source_a = match a {
                Ok(source) => source.health_check().await,
                Err(e) => HealthStatus::failed(&e),
            };
            let source_b = match b {
                Ok(source) => source.health_check().await,
                Err(e) => HealthStatus::failed(&e),
            };
            let result = HealthCheckResult {
                healthy: source_a.connected && source_b.connected,
                source_a,
                source_b,
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                print_health("Source A (pre-migration)", &result.source_a);
                print_health("Source B (post-migration)", &result.source_b);
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            Ok(if result.healthy { 0 } else { EXIT_SOURCE_ERROR })
        }
    }
}

fn print_health(label: &str, status: &HealthStatus) {
    println!(
        "  {}: {} ({}ms)",
        label,
        if status.connected { "OK" } else { "FAILED" },
        status.latency_ms
    );
    if let Some(ref err) = status.error {
        println!("    Error: {}", err);
    }
}

/// Pick the table to compare: configured, or discovered on both sides.
async fn resolve_table(
    config: &Config,
    source_a: &PostgresChunkSource,
    source_b: &PostgresChunkSource,
) -> Result<String, VerifyError> {
    if let Some(table) = &config.verify.table {
        return Ok(table.clone());
    }

    let (table_a, table_b) = tokio::try_join!(source_a.discover_table(), source_b.discover_table())?;
    if table_a != table_b {
        warn!(
            "Discovered different tables: '{}' on side A, '{}' on side B; verifying '{}'",
            table_a, table_b, table_a
        );
    } else {
        info!("Discovered table '{}'", table_a);
    }
    Ok(table_a)
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, VerifyError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        sigint.recv().await;
        eprintln!(
            "\nReceived SIGINT. Shutting down gracefully (timeout: {}s)...",
            shutdown_timeout
        );
        token_int.cancel();
        force_exit_after(shutdown_timeout).await;
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        sigterm.recv().await;
        eprintln!(
            "\nReceived SIGTERM. Shutting down gracefully (timeout: {}s)...",
            shutdown_timeout
        );
        token_term.cancel();
        force_exit_after(shutdown_timeout).await;
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only SIGINT/Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, VerifyError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
            token.cancel();
            force_exit_after(shutdown_timeout).await;
        }
    });

    Ok(cancel_token)
}

/// Exit with the cancellation code if graceful shutdown takes too long.
async fn force_exit_after(shutdown_timeout: u64) {
    tokio::time::sleep(std::time::Duration::from_secs(shutdown_timeout)).await;
    eprintln!("Graceful shutdown timed out after {}s", shutdown_timeout);
    std::process::exit(i32::from(pg_migrate_verify::error::EXIT_CANCELLED));
}
