//! RAG Ingest CLI
//!
//! Runs the ingest worker against the shared pages backlog. Supports
//! continuous worker mode, single-batch and single-page runs, and a status
//! report over the backlog.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rag_ingest::db::{create_pool_from_env, pages};
use rag_ingest::ingest::IngestClient;
use rag_ingest::worker::{setup_signal_handler, BatchRunner, WorkerConfig};
use rag_ingest::ExtractorOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rag-ingest")]
#[command(about = "Extract PDF content and ingest backlog pages into a knowledge base")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as worker, claiming and processing backlog pages
    Worker {
        /// Worker identity used as claim owner (default: worker-<pid>)
        #[arg(short, long)]
        worker_id: Option<String>,

        /// Pages to claim per batch
        #[arg(short, long, default_value = "10")]
        batch_size: usize,

        /// Only process pages in this subcategory
        #[arg(long)]
        subcategory: Option<String>,

        /// Only process pages with exactly this many datasheets
        #[arg(long)]
        datasheet_count: Option<i64>,

        /// Poll interval in seconds for the completion poller
        #[arg(short, long, default_value = "30")]
        poll_interval: u64,

        /// Per-job extraction timeout in seconds
        #[arg(short, long, default_value = "1200")]
        timeout: u64,

        /// Directory for extraction output
        #[arg(short, long, default_value = "./output")]
        output_dir: PathBuf,

        /// Run a single batch and exit
        #[arg(long)]
        once: bool,
    },

    /// Process one page end-to-end by id
    Process {
        /// Page id from the backlog
        #[arg(short, long)]
        page_id: i64,

        /// Per-job extraction timeout in seconds
        #[arg(short, long, default_value = "1200")]
        timeout: u64,

        /// Directory for extraction output
        #[arg(short, long, default_value = "./output")]
        output_dir: PathBuf,
    },

    /// Report backlog progress
    Status {
        /// Restrict the report to one subcategory
        #[arg(long)]
        subcategory: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Worker {
            worker_id,
            batch_size,
            subcategory,
            datasheet_count,
            poll_interval,
            timeout,
            output_dir,
            once,
        } => {
            info!("Initializing worker...");

            let pool = create_pool_from_env().await?;
            info!("Database connection established");

            let mut builder = WorkerConfig::builder()
                .batch_size(batch_size)
                .subcategory(subcategory)
                .datasheet_count(datasheet_count)
                .poll_interval_secs(poll_interval)
                .job_timeout(Duration::from_secs(timeout))
                .output_dir(output_dir);
            if let Some(id) = &worker_id {
                builder = builder.worker_id(id);
            }
            let config = builder.build();

            let ingest = Arc::new(IngestClient::from_env()?);
            if !ingest.health_check().await {
                warn!("Knowledge-base server did not answer the health probe; uploads may fail");
            }

            let runner = BatchRunner::new(pool, config, ingest, ExtractorOptions::from_env())?;

            if once {
                info!("Running in single-batch mode...");
                let summary = runner.run_once().await?;
                println!("Batch complete: {}", summary);
            } else {
                let shutdown = runner.shutdown_handle();
                setup_signal_handler(shutdown);
                runner.run().await?;
            }
        }

        Commands::Process {
            page_id,
            timeout,
            output_dir,
        } => {
            let pool = create_pool_from_env().await?;

            let config = WorkerConfig::builder()
                .batch_size(1)
                .job_timeout(Duration::from_secs(timeout))
                .output_dir(output_dir)
                .build();

            let ingest = Arc::new(IngestClient::from_env()?);
            let runner = BatchRunner::new(pool, config, ingest, ExtractorOptions::from_env())?;

            let summary = runner.run_single(page_id).await?;
            if summary.success > 0 {
                println!("Page {} processed and ingested", page_id);
            } else {
                eprintln!("Page {} was not ingested ({})", page_id, summary);
                std::process::exit(1);
            }
        }

        Commands::Status { subcategory } => {
            let pool = create_pool_from_env().await?;
            let status = pages::backlog_status(&pool, subcategory.as_deref()).await?;

            println!(
                "{}/{} pages processed ({} remaining)",
                status.processed, status.total, status.remaining
            );
        }
    }

    Ok(())
}
