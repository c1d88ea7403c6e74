//! Apache Solr binding.
//!
//! Talks to a single core (`http://solr:8983/solr/<core>`). Documents are
//! posted as JSON arrays to the update handler without committing; one
//! commit is issued after the last batch. The `id` field stays in the
//! document body because it is the core's unique key.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{classify_provision_response, truncate, HttpClients, Provisioned, SearchEngine};
use crate::error::{SeedError, SeedResult};
use crate::models::{BatchReport, Document};

pub struct SolrEngine {
    http: HttpClients,
    core_url: String,
}

impl SolrEngine {
    pub(crate) fn new(http: HttpClients, core_url: String) -> Self {
        Self { http, core_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.core_url, path)
    }

    async fn post_update(&self, query: &str, body: &Value, batch: usize) -> SeedResult<()> {
        let response = self
            .http
            .client
            .post(self.url(&format!("update?{}", query)))
            .json(body)
            .send()
            .await
            .map_err(|e| SeedError::transport(batch, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(SeedError::transport(
            batch,
            format!("status {}: {}", status, truncate(&text, 512)),
        ))
    }
}

/// A ping is healthy when the body is not JSON or reports `status: OK`.
fn ping_body_ok(body: &str) -> bool {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json
            .get("status")
            .and_then(Value::as_str)
            .map_or(true, |s| s.eq_ignore_ascii_case("ok")),
        Err(_) => true,
    }
}

fn schema_payload(dimension: usize) -> Value {
    json!({
        "add-field-type": {
            "name": "knn_vector",
            "class": "solr.DenseVectorField",
            "vectorDimension": dimension,
            "similarityFunction": "cosine",
            "knnAlgorithm": "hnsw"
        },
        "add-field": {
            "name": "vector",
            "type": "knn_vector",
            "indexed": true,
            "stored": true
        }
    })
}

#[async_trait]
impl SearchEngine for SolrEngine {
    fn name(&self) -> &str {
        "solr"
    }

    fn health_url(&self) -> String {
        self.url("admin/ping?wt=json")
    }

    async fn health(&self) -> bool {
        let Ok(response) = self.http.probe.get(self.health_url()).send().await else {
            return false;
        };
        if !response.status().is_success() {
            return false;
        }
        response.text().await.map_or(false, |body| ping_body_ok(&body))
    }

    async fn count(&self) -> SeedResult<u64> {
        let response = self
            .http
            .client
            .get(self.url("select"))
            .query(&[("q", "*:*"), ("wt", "json"), ("rows", "0")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SeedError::CountProbeFailure(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SeedError::CountProbeFailure(e.to_string()))?;

        Ok(body
            .pointer("/response/numFound")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    async fn provision_vector_field(&self, dimension: usize) -> SeedResult<Provisioned> {
        let url = self.url("schema");
        info!(dimension, url = %url, "Creating vector field");

        let response = self
            .http
            .client
            .post(&url)
            .json(&schema_payload(dimension))
            .send()
            .await
            .map_err(|e| SeedError::SchemaProvisionFailure(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_provision_response(status, &body)
    }

    async fn delete_all(&self) -> SeedResult<()> {
        self.post_update("commit=true", &json!({ "delete": { "query": "*:*" } }), 0)
            .await?;
        info!("Deleted all documents before reindexing");
        Ok(())
    }

    async fn submit_batch(&self, batch: usize, docs: Vec<Document>) -> SeedResult<BatchReport> {
        let submitted = docs.len();
        let payload = Value::Array(docs.into_iter().map(Value::Object).collect());
        self.post_update("commit=false", &payload, batch).await?;
        debug!(batch, submitted, "Batch accepted");
        Ok(BatchReport::all_ok(submitted))
    }

    fn buffers_writes(&self) -> bool {
        true
    }

    async fn commit(&self) -> SeedResult<()> {
        self.post_update("commit=true", &json!({ "commit": {} }), 0).await
    }
}
