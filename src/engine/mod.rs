//! Search engine bindings.
//!
//! Defines the [`SearchEngine`] trait, the one seam between the pipeline
//! and a concrete engine, and three implementations:
//! - **[`SolrEngine`]** — JSON update handler, Schema API, explicit commit.
//! - **[`ElasticsearchEngine`]** — `_bulk` NDJSON, `_mapping`, `_refresh`.
//! - **[`VespaEngine`]** — application package deployment and the
//!   `/document/v1` API, one request per document.
//!
//! Use [`create_engine`] to build the binding named in the configuration.
//!
//! # Error translation
//!
//! Bindings never leak `reqwest` errors. Each operation maps transport and
//! protocol failures onto the matching [`SeedError`] kind:
//!
//! | Operation | Error kind |
//! |-----------|------------|
//! | `health` | none (returns `false`) |
//! | `count` | `CountProbeFailure` |
//! | `provision_vector_field` | `SchemaProvisionFailure` |
//! | `submit_batch` / `submit_document` / `commit` | `BatchTransportFailure` |
//! | `deploy` / `ensure_collection` | `Deployment` |

mod elasticsearch;
mod solr;
mod vespa;

pub use elasticsearch::ElasticsearchEngine;
pub use solr::SolrEngine;
pub use vespa::VespaEngine;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::{Config, EngineKind};
use crate::error::{SeedError, SeedResult};
use crate::models::{BatchReport, Document};
use crate::readiness::ReadinessGate;

/// Result of a vector field provisioning request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

/// Capabilities the seeding pipeline needs from a search engine.
///
/// Lifecycle during one run:
///
/// 1. [`deploy`](SearchEngine::deploy) (engines that ship an application)
/// 2. readiness gate on [`health`](SearchEngine::health)
/// 3. [`ensure_collection`](SearchEngine::ensure_collection)
/// 4. [`count`](SearchEngine::count)
/// 5. [`provision_vector_field`](SearchEngine::provision_vector_field) when
///    embeddings are present
/// 6. [`delete_all`](SearchEngine::delete_all) when reindexing is forced
/// 7. [`submit_batch`](SearchEngine::submit_batch) or
///    [`submit_document`](SearchEngine::submit_document), then
///    [`commit`](SearchEngine::commit) if the engine buffers writes
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Short engine name used in logs (e.g. `"solr"`).
    fn name(&self) -> &str;

    /// URL probed by [`health`](SearchEngine::health).
    fn health_url(&self) -> String;

    /// One health probe. Any failure is reported as `false`.
    async fn health(&self) -> bool;

    /// Pushes whatever the engine needs before it can become healthy.
    async fn deploy(&self, _gate: &ReadinessGate) -> SeedResult<()> {
        Ok(())
    }

    /// Creates the target index or collection if it does not exist.
    async fn ensure_collection(&self) -> SeedResult<()> {
        Ok(())
    }

    /// Number of documents currently searchable.
    async fn count(&self) -> SeedResult<u64>;

    /// Declares a cosine dense-vector field named `vector`.
    async fn provision_vector_field(&self, dimension: usize) -> SeedResult<Provisioned>;

    /// Removes every document before a forced reindex.
    async fn delete_all(&self) -> SeedResult<()> {
        Ok(())
    }

    /// Sends one batch. `Err` means the batch as a whole was not
    /// delivered; rejected documents inside a delivered batch are listed
    /// in the report.
    async fn submit_batch(&self, batch: usize, docs: Vec<Document>) -> SeedResult<BatchReport>;

    /// Sends one document. Used by the streaming ingestion mode.
    async fn submit_document(&self, doc: Document) -> SeedResult<()> {
        let report = self.submit_batch(0, vec![doc]).await?;
        match report.failures.into_iter().next() {
            Some(failure) => Err(SeedError::transport(0, failure.reason)),
            None => Ok(()),
        }
    }

    /// Whether written documents stay invisible until [`commit`](SearchEngine::commit).
    fn buffers_writes(&self) -> bool {
        false
    }

    /// Makes all submitted documents visible to queries.
    async fn commit(&self) -> SeedResult<()> {
        Ok(())
    }
}

/// HTTP clients shared by the bindings.
///
/// `client` carries the ingestion timeout and is used for every write;
/// `probe` carries the short per-attempt readiness timeout.
#[derive(Debug, Clone)]
pub(crate) struct HttpClients {
    pub client: reqwest::Client,
    pub probe: reqwest::Client,
}

impl HttpClients {
    pub fn new(request_timeout: Duration, probe_timeout: Duration) -> SeedResult<Self> {
        let build = |timeout: Duration| {
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| SeedError::Config(format!("failed to build HTTP client: {}", e)))
        };
        Ok(Self {
            client: build(request_timeout)?,
            probe: build(probe_timeout)?,
        })
    }

    /// `true` when a GET on `url` answers with a 2xx status.
    pub async fn probe_ok(&self, url: &str) -> bool {
        match self.probe.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Interprets a schema/mapping mutation response.
///
/// A 4xx whose body says the field already exists is benign.
pub(crate) fn classify_provision_response(
    status: StatusCode,
    body: &str,
) -> SeedResult<Provisioned> {
    if status.is_success() {
        return Ok(Provisioned::Created);
    }
    if status.is_client_error() && body.to_ascii_lowercase().contains("already exists") {
        return Ok(Provisioned::AlreadyExists);
    }
    Err(SeedError::SchemaProvisionFailure(format!(
        "status {}: {}",
        status,
        truncate(body, 512)
    )))
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Builds the binding selected by `engine.kind`.
pub fn create_engine(config: &Config) -> SeedResult<Arc<dyn SearchEngine>> {
    let http = HttpClients::new(config.ingest.timeout(), config.readiness.attempt_timeout())?;
    let endpoint = config.engine.endpoint.trim().trim_end_matches('/').to_string();

    let engine: Arc<dyn SearchEngine> = match config.engine.kind {
        EngineKind::Solr => Arc::new(SolrEngine::new(http, endpoint)),
        EngineKind::Elasticsearch => Arc::new(ElasticsearchEngine::new(
            http,
            endpoint,
            config.engine.index_name.clone(),
        )),
        EngineKind::Vespa => Arc::new(VespaEngine::new(http, endpoint, config.engine.vespa.clone())),
    };
    Ok(engine)
}
