//! stockwatch - command-line client for the stock analysis service.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stockwatch_app::confirm::{AssumeYes, TerminalPrompt};
use stockwatch_app::config::CONFIG_ENV;
use stockwatch_app::{AppConfig, Application};
use stockwatch_core::{BacktestRequest, BulkKind, ProcessingState};
use stockwatch_jobs::JobView;
use stockwatch_sync::{BatchFetcher, ImportFile, ImportOutcome, OverwriteConfirm};
use tracing::info;

/// Trigger and watch analysis runs, backtests and bulk transfers.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via STOCKWATCH_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh every read model and print a summary
    Status {
        /// Print the read models as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the market analysis and wait for it to finish
    Analyze,
    /// Run a backtest for one symbol
    Backtest {
        symbol: String,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        end: String,
    },
    /// Look up current prices (defaults to the monitored list)
    Prices { symbols: Vec<String> },
    /// Download a collection (monitored | trades)
    Export {
        kind: BulkKind,
        /// Directory to write into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Replace a collection with a JSON file
    Import {
        kind: BulkKind,
        file: PathBuf,
        /// Overwrite without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Print Prometheus metrics collected during this run
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config before logging: the filter lives in the config.
    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };
    stockwatch_telemetry::init_logging(&config.telemetry.log_filter)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.backend.base_url,
        config_env = CONFIG_ENV,
        "Starting stockwatch"
    );

    let app = Application::new(config)?;

    let outcome = tokio::select! {
        res = run(&app, args.command) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };
    app.shutdown();
    outcome
}

async fn run(app: &Application, command: Command) -> Result<()> {
    match command {
        Command::Status { json } => status(app, json).await,
        Command::Analyze => {
            let mut last = None;
            let view = app
                .run_analysis(|view| {
                    let line = format!("[{}] {} {}%", view.state, view.stage, view.progress);
                    if last.as_ref() != Some(&line) {
                        eprintln!("{line}");
                        last = Some(line);
                    }
                })
                .await?;
            finish(&view)
        }
        Command::Backtest { symbol, start, end } => {
            let request = BacktestRequest::parse(&symbol, &start, &end)?;
            let mut printed = 0;
            let view = app
                .run_backtest(request, |view| {
                    // Logs are cumulative; print only the new tail.
                    if let Some(status) = &view.last_status {
                        for line in status.logs.iter().skip(printed) {
                            eprintln!("{line}");
                        }
                        printed = printed.max(status.logs.len());
                    }
                })
                .await?;
            if let Some(result) = view.last_status.as_ref().and_then(|s| s.result.as_ref()) {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            finish(&view)
        }
        Command::Prices { symbols } => {
            let prices = if symbols.is_empty() {
                app.refresh().await?;
                app.coordinator().snapshot().prices
            } else {
                let fetcher = BatchFetcher::new(
                    app.coordinator().backend().clone(),
                    (&app.config().prices).into(),
                );
                fetcher.fetch(&symbols).await
            };
            for entry in prices.values() {
                println!("{:<10} {}", entry.symbol, entry.display());
            }
            Ok(())
        }
        Command::Export { kind, out } => {
            let file = app.reconciler().export(kind).await?;
            let path = out.join(&file.filename);
            tokio::fs::write(&path, &file.bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Import { kind, file, yes } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let confirm: &dyn OverwriteConfirm = if yes { &AssumeYes } else { &TerminalPrompt };
            match app
                .reconciler()
                .import(kind, ImportFile::new(filename, bytes), confirm)
                .await?
            {
                ImportOutcome::Imported { count } => {
                    println!("Imported {count} records into {kind}")
                }
                ImportOutcome::Cancelled => println!("Import cancelled"),
            }
            Ok(())
        }
        Command::Metrics => {
            app.refresh().await?;
            print!("{}", stockwatch_telemetry::Metrics::gather_text()?);
            Ok(())
        }
    }
}

async fn status(app: &Application, json: bool) -> Result<()> {
    let report = app.refresh().await?;
    let models = app.coordinator().snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        println!(
            "Last update:  {}",
            models.last_update.as_deref().unwrap_or("-")
        );
        if let Some(analysis) = &models.analysis {
            println!("Ranked:       {} stocks", analysis.result_len());
        }
        for kind in BulkKind::ALL {
            let count = models.collection(kind).map_or(0, |c| c.len());
            println!("{:<13} {count} records", format!("{kind}:"));
        }
        for entry in models.prices.values() {
            println!("  {:<10} {}", entry.symbol, entry.display());
        }
    }
    for (slice, error) in &report.failed {
        eprintln!("warning: {slice} not refreshed: {error}");
    }
    Ok(())
}

fn finish<S>(view: &JobView<S>) -> Result<()> {
    match view.state {
        ProcessingState::Failed => bail!("{} failed: {}", view.job, view.message),
        _ => {
            println!("{} {}", view.job, view.state);
            Ok(())
        }
    }
}
