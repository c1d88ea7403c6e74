//! # Search Seed CLI (`seed`)
//!
//! Seeds a search engine with a dataset, typically as the init container
//! of a search stack.
//!
//! ## Usage
//!
//! ```bash
//! seed --config ./config/seed.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `seed run` | Wait for the engine, then index the dataset if it is empty |
//! | `seed status` | Print engine health and document count |
//! | `seed merge` | Join embeddings into the dataset and write the merged file |
//!
//! Exit status is 0 on success and on a clean skip (engine already
//! populated), 1 on any fatal error.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use search_seed::config;
use search_seed::engine;
use search_seed::logging;
use search_seed::pipeline::{self, SeedReport};

/// Search Seed CLI — readiness-gated, embedding-aware bulk seeding for
/// Solr, Elasticsearch and Vespa.
#[derive(Parser)]
#[command(
    name = "seed",
    about = "Seed a search engine with a dataset and optional embeddings",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/seed.toml")]
    config: PathBuf,

    /// Override `engine.endpoint`.
    #[arg(long, global = true, env = "SEED_ENDPOINT")]
    endpoint: Option<String>,

    /// Override `dataset.path`.
    #[arg(long, global = true, env = "DATASET")]
    dataset: Option<PathBuf>,

    /// Override `dataset.merged_path`.
    #[arg(long, global = true, env = "TMP_FILE")]
    merged_path: Option<PathBuf>,

    /// Override both the readiness and the ingestion timeout, in seconds.
    #[arg(long, global = true, env = "DEFAULT_TIMEOUT")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the engine and index the dataset.
    ///
    /// Indexing only happens when the engine holds no documents or
    /// `--force-reindex` is given.
    Run {
        /// Reindex even when the engine already holds documents.
        #[arg(long, env = "FORCE_REINDEX")]
        force_reindex: bool,

        /// Override `ingest.batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Print engine health and document count.
    Status,

    /// Join embeddings into the dataset and write `dataset.merged_path`.
    Merge,
}

fn apply_overrides(cfg: &mut config::Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(endpoint) = &cli.endpoint {
        cfg.engine.endpoint = endpoint.clone();
    }
    if let Some(dataset) = &cli.dataset {
        cfg.dataset.path = dataset.clone();
    }
    if let Some(merged) = &cli.merged_path {
        cfg.dataset.merged_path = Some(merged.clone());
    }
    if let Some(timeout) = cli.timeout {
        cfg.readiness.timeout_secs = timeout;
        cfg.ingest.timeout_secs = timeout;
    }
    if let Commands::Run {
        force_reindex,
        batch_size,
    } = &cli.command
    {
        cfg.ingest.force_reindex |= *force_reindex;
        if let Some(size) = batch_size {
            cfg.ingest.batch_size = *size;
        }
    }
    cfg.validate()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load_config(&cli.config)?;
    apply_overrides(&mut cfg, &cli)?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Run { .. } => {
            let engine = engine::create_engine(&cfg)?;
            let report = pipeline::run_seed(&cfg, engine)
                .await
                .context("seeding failed")?;
            match report {
                SeedReport::Skipped { existing } => {
                    println!("skipped: engine already holds {} documents", existing);
                }
                SeedReport::Ingested { outcome, dimension } => {
                    println!("seed {}", cfg.engine.kind.as_str());
                    println!("  documents: {}", outcome.total);
                    println!("  indexed: {}", outcome.succeeded);
                    println!("  failed: {}", outcome.failed);
                    println!("  batches: {}", outcome.batches);
                    if let Some(dim) = dimension {
                        println!("  vector dimension: {}", dim);
                    }
                    println!("{}", if outcome.is_success() { "ok" } else { "degraded" });
                }
            }
        }
        Commands::Status => {
            let engine = engine::create_engine(&cfg)?;
            let status = pipeline::engine_status(engine.as_ref()).await;
            println!("{:<16} {:<8} DOCUMENTS", "ENGINE", "HEALTHY");
            println!(
                "{:<16} {:<8} {}",
                status.engine,
                status.healthy,
                status
                    .count
                    .map_or_else(|| "-".to_string(), |c| c.to_string())
            );
            if !status.healthy {
                anyhow::bail!("{} is not healthy", status.health_url);
            }
        }
        Commands::Merge => {
            let written = pipeline::merge_only(&cfg)?;
            println!("merged {} documents", written);
        }
    }

    Ok(())
}
