//! Seeding orchestration.
//!
//! Sequences one run against a single engine:
//!
//! ```text
//! deploy ─▶ readiness gate ─▶ ensure collection ─▶ count
//!                                                    │
//!                    count > 0 && !force ◀───────────┤───────▶ skip
//!                                                    ▼
//!            load dataset + embeddings ─▶ join ─▶ provision ─▶ ingest ─▶ commit
//! ```
//!
//! Nothing touches the dataset before the engine passed the readiness
//! gate, and nothing touches the engine's contents when it already holds
//! documents unless reindexing is forced.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{Config, Strictness};
use crate::dataset;
use crate::engine::{Provisioned, SearchEngine};
use crate::error::{SeedError, SeedResult};
use crate::ingest::{self, IngestOptions};
use crate::join;
use crate::models::{EmbeddingIndex, IngestionOutcome};
use crate::readiness::ReadinessGate;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedReport {
    /// The engine already held documents and reindexing was not forced.
    Skipped { existing: u64 },
    Ingested {
        outcome: IngestionOutcome,
        /// Dimension of the provisioned vector field, if any.
        dimension: Option<usize>,
    },
}

/// Decision rule: ingest iff the engine is empty or reindexing is forced.
pub fn should_ingest(count: u64, force_reindex: bool) -> bool {
    count == 0 || force_reindex
}

/// Waits for the engine, deploying first when the engine needs it.
pub async fn await_engine(engine: &dyn SearchEngine, gate: &ReadinessGate) -> SeedResult<()> {
    engine.deploy(gate).await?;
    let url = engine.health_url();
    gate.wait(&url, || engine.health()).await?;
    Ok(())
}

/// Reads the document count, applying the configured failure policy.
pub async fn probe_count(engine: &dyn SearchEngine, policy: Strictness) -> SeedResult<u64> {
    match engine.count().await {
        Ok(count) => Ok(count),
        Err(e) => match policy {
            Strictness::Lenient => {
                warn!(engine = engine.name(), error = %e, "Unable to get document count, assuming empty");
                Ok(0)
            }
            Strictness::Strict => {
                error!(engine = engine.name(), error = %e, "Unable to get document count");
                Err(e)
            }
        },
    }
}

/// Creates the vector field, applying the configured failure policy.
pub async fn provision(
    engine: &dyn SearchEngine,
    dimension: usize,
    policy: Strictness,
) -> SeedResult<()> {
    match engine.provision_vector_field(dimension).await {
        Ok(Provisioned::Created) => {
            info!(dimension, "Vector field created");
            Ok(())
        }
        Ok(Provisioned::AlreadyExists) => {
            info!(dimension, "Vector field already exists");
            Ok(())
        }
        Err(e) => match policy {
            Strictness::Strict => {
                error!(error = %e, "Failed to provision vector field");
                Err(e)
            }
            Strictness::Lenient => {
                warn!(error = %e, "Failed to provision vector field, continuing without it");
                Ok(())
            }
        },
    }
}

/// Runs the full pipeline against `engine`.
pub async fn run_seed(config: &Config, engine: Arc<dyn SearchEngine>) -> SeedResult<SeedReport> {
    info!(engine = engine.name(), "Starting seed");
    let gate = ReadinessGate::from_config(&config.readiness);

    await_engine(engine.as_ref(), &gate).await?;
    engine.ensure_collection().await?;

    let count = probe_count(engine.as_ref(), config.count_probe_policy()).await?;
    info!(engine = engine.name(), count, "Engine reports {} documents", count);

    let force = config.ingest.force_reindex;
    if !should_ingest(count, force) {
        info!("Skipping indexing as there are already docs indexed. Use force_reindex to re-index");
        return Ok(SeedReport::Skipped { existing: count });
    }

    let docs = dataset::load_documents(&config.dataset.path, config.dataset.format)?;
    let embeddings = match &config.dataset.embeddings_path {
        Some(path) => dataset::load_embeddings(path)?,
        None => EmbeddingIndex::new(),
    };

    let (working_set, dimension) = if embeddings.is_empty() {
        info!("Using plain dataset without embeddings");
        if let Some(merged) = &config.dataset.merged_path {
            remove_stale_scratch(merged);
        }
        (docs, None)
    } else {
        let sampled = if config.policy.validate_dimensions {
            join::validate_dimensions(&embeddings)?
        } else {
            embeddings.dimension()
        };
        let dimension =
            sampled.ok_or_else(|| SeedError::Config("no valid embeddings detected".to_string()))?;
        info!(dimension, "Detected embedding dimension");

        let merged = join::join(&docs, &embeddings);
        if let Some(path) = &config.dataset.merged_path {
            if let Err(e) = join::write_merged(path, &merged) {
                warn!(path = %path.display(), error = %e, "Could not write merged dataset");
            }
        }
        provision(engine.as_ref(), dimension, config.provisioning_policy()).await?;
        (merged, Some(dimension))
    };

    // An empty dataset must never wipe a populated engine.
    if force && !working_set.is_empty() {
        engine.delete_all().await?;
    }

    let options = IngestOptions::from_config(
        &config.ingest,
        config.ingest_mode(),
        config.failure_mode(),
    );
    let outcome = ingest::ingest(engine, working_set, &options).await?;

    Ok(SeedReport::Ingested { outcome, dimension })
}

/// Health and document count of an engine, without ingesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub engine: String,
    pub health_url: String,
    pub healthy: bool,
    pub count: Option<u64>,
}

pub async fn engine_status(engine: &dyn SearchEngine) -> EngineStatus {
    let healthy = engine.health().await;
    let count = if healthy { engine.count().await.ok() } else { None };
    EngineStatus {
        engine: engine.name().to_string(),
        health_url: engine.health_url(),
        healthy,
        count,
    }
}

/// Joins the dataset with its embeddings and writes the merged file,
/// without contacting any engine. Returns the number of documents written.
pub fn merge_only(config: &Config) -> SeedResult<usize> {
    let merged_path = config
        .dataset
        .merged_path
        .as_deref()
        .ok_or_else(|| SeedError::Config("dataset.merged_path is not set".to_string()))?;
    let docs = dataset::load_documents(&config.dataset.path, config.dataset.format)?;
    let embeddings = match &config.dataset.embeddings_path {
        Some(path) => dataset::load_embeddings(path)?,
        None => EmbeddingIndex::new(),
    };
    if config.policy.validate_dimensions {
        join::validate_dimensions(&embeddings)?;
    }
    let merged = join::join(&docs, &embeddings);
    join::write_merged(merged_path, &merged)?;
    Ok(merged.len())
}

fn remove_stale_scratch(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "Removed stale merged dataset"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove merged dataset"),
    }
}
