//! scopus-harvester - batch Scopus CSV exports for ISSN spreadsheets
//!
//! ## Usage
//!
//! ```bash
//! scopus-harvester --config harvester.json serve
//! scopus-harvester upload journals.xlsx --wait
//! scopus-harvester requeue 12 13
//! scopus-harvester status 12
//! scopus-harvester check-vpn
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use scopus_harvester::{
    BatchId, BatchInfo, BatchStatus, Config, Event, Harvester, ReportMessage, run_with_shutdown,
    types::MessageLevel,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

// ============================================================================
// CLI Definition
// ============================================================================

/// Scopus export harvester for ISSN spreadsheets
#[derive(Parser)]
#[command(name = "scopus-harvester")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher and the REST API until interrupted
    Serve,

    /// Ingest a spreadsheet (.csv, .xlsx, .xls) into a new batch
    Upload {
        /// Spreadsheet with an ISSN column
        file: PathBuf,

        /// Process the batch in this process and wait for it to finish
        #[arg(long)]
        wait: bool,
    },

    /// Re-process the failed identifiers of one or more batches
    Requeue {
        /// Batches to re-queue
        #[arg(required = true)]
        batch_ids: Vec<i64>,

        /// Process the batches in this process and wait for them to finish
        #[arg(long)]
        wait: bool,
    },

    /// Show all batches, or one batch with its identifiers
    Status {
        /// Batch to show in detail
        batch_id: Option<i64>,
    },

    /// Dial the VPN once and report whether it came up
    CheckVpn,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(cli.debug, cli.json_logs);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Upload { file, wait } => upload(config, file, wait).await,
        Commands::Requeue { batch_ids, wait } => requeue(config, batch_ids, wait).await,
        Commands::Status { batch_id } => status(config, batch_id).await,
        Commands::CheckVpn => check_vpn(config).await,
    }
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let builder = fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ============================================================================
// Commands
// ============================================================================

async fn serve(config: Config) -> Result<()> {
    let harvester = Arc::new(Harvester::new(config).await?);
    let capabilities = harvester.capabilities();
    tracing::info!(
        vpn_gate = %capabilities.vpn_gate,
        browser = %capabilities.browser,
        "Harvester started"
    );

    let dispatcher = harvester.start_dispatcher();
    let api = harvester.spawn_api_server();

    tokio::select! {
        result = run_with_shutdown(&harvester) => result?,
        joined = api => {
            match joined {
                Ok(Ok(())) => tracing::warn!("API server exited"),
                Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
                Err(e) => tracing::error!(error = %e, "API server task panicked"),
            }
            harvester.shutdown().await?;
        }
    }

    dispatcher.await.context("dispatcher task panicked")?;
    Ok(())
}

async fn upload(config: Config, file: PathBuf, wait: bool) -> Result<()> {
    let harvester = Harvester::new(config).await?;
    let mut events = harvester.subscribe();

    let report = harvester
        .upload_file(&file)
        .await
        .with_context(|| format!("uploading {}", file.display()))?;
    print_messages(&report.messages);

    if report.status == BatchStatus::Failed {
        bail!("batch {} was not created", report.batch_id);
    }

    if wait {
        harvester.start_dispatcher();
        let status = wait_for(&mut events, &[report.batch_id]).await?;
        println!("batch {}: {}", report.batch_id, status[0]);
        harvester.shutdown().await?;
    } else {
        println!(
            "batch {} queued with {} ISSNs; it runs on the next `serve`",
            report.batch_id,
            report.created.len()
        );
    }
    Ok(())
}

async fn requeue(config: Config, batch_ids: Vec<i64>, wait: bool) -> Result<()> {
    let harvester = Harvester::new(config).await?;
    let mut events = harvester.subscribe();
    let batch_ids: Vec<BatchId> = batch_ids.into_iter().map(BatchId).collect();

    let report = harvester.requeue(&batch_ids).await?;
    print_messages(&report.messages);

    if wait && !report.requeued.is_empty() {
        harvester.start_dispatcher();
        let statuses = wait_for(&mut events, &report.requeued).await?;
        for (id, status) in report.requeued.iter().zip(statuses) {
            println!("batch {}: {}", id, status);
        }
        harvester.shutdown().await?;
    }
    Ok(())
}

async fn status(config: Config, batch_id: Option<i64>) -> Result<()> {
    let harvester = Harvester::new(config).await?;

    let Some(batch_id) = batch_id else {
        for batch in harvester.list_batches().await? {
            print_batch(&batch);
        }
        return Ok(());
    };

    let batch_id = BatchId(batch_id);
    print_batch(&harvester.batch_info(batch_id).await?);

    let filter = scopus_harvester::db::IdentifierFilter {
        batch_id: Some(batch_id),
        status: None,
    };
    for row in harvester.db.list_identifiers(&filter).await? {
        let detail = row
            .error_message
            .clone()
            .or_else(|| row.article_count.map(|n| format!("{} articles", n)))
            .unwrap_or_default();
        println!("  {:>6}  {}  {:<20} {}", row.id, row.code, row.status(), detail);
    }
    Ok(())
}

async fn check_vpn(config: Config) -> Result<()> {
    let harvester = Harvester::new(config).await?;
    let gate = harvester.capabilities().vpn_gate;

    if harvester.check_vpn().await {
        println!("VPN connection via {} succeeded", gate);
        Ok(())
    } else {
        bail!("VPN connection via {} failed", gate)
    }
}

// ============================================================================
// Output helpers
// ============================================================================

/// Wait until every batch in `batch_ids` leaves `PROCESSING`
async fn wait_for(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    batch_ids: &[BatchId],
) -> Result<Vec<BatchStatus>> {
    let mut finished: Vec<Option<BatchStatus>> = vec![None; batch_ids.len()];

    while finished.iter().any(Option::is_none) {
        match events.recv().await {
            Ok(Event::BatchStatusChanged { id, status }) if status != BatchStatus::Processing => {
                if let Some(pos) = batch_ids.iter().position(|b| *b == id) {
                    finished[pos] = Some(status);
                }
            }
            Ok(Event::IdentifierFinished { code, status, .. }) => {
                println!("  {} {}", code, status);
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Missed progress events");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                bail!("harvester stopped before the batches finished")
            }
        }
    }

    Ok(finished.into_iter().flatten().collect())
}

fn print_messages(messages: &[ReportMessage]) {
    for message in messages {
        let tag = match message.level {
            MessageLevel::Success => "ok",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        };
        println!("[{}] {}", tag, message.text);
    }
}

fn print_batch(batch: &BatchInfo) {
    println!(
        "batch {:>4}  {:<16} {} completed, {} no results, {} failed, {} pending  {}",
        batch.id,
        batch.status,
        batch.counts.completed,
        batch.counts.no_results,
        batch.counts.failed,
        batch.counts.pending + batch.counts.processing,
        batch.original_filename.as_deref().unwrap_or("-"),
    );
}
