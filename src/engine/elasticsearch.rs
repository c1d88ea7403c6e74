//! Elasticsearch binding.
//!
//! Documents are written through `_bulk` as NDJSON action/source pairs.
//! The `id` field is moved into the action line as `_id` and removed from
//! the source, so it routes the document without being indexed twice.
//!
//! `_bulk` answers 200 even when individual items are rejected, so the
//! response body is inspected for per-item errors.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{classify_provision_response, truncate, HttpClients, Provisioned, SearchEngine};
use crate::error::{SeedError, SeedResult};
use crate::models::{split_id, BatchReport, Document, DocumentFailure};

pub struct ElasticsearchEngine {
    http: HttpClients,
    host: String,
    index: String,
}

impl ElasticsearchEngine {
    pub(crate) fn new(http: HttpClients, host: String, index: String) -> Self {
        Self { http, host, index }
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.host, self.index)
    }
}

/// Renders a batch as a `_bulk` request body.
fn bulk_body(index: &str, docs: Vec<Document>) -> SeedResult<String> {
    let mut body = String::new();
    for doc in docs {
        let (id, source) = split_id(doc);
        let mut action = json!({ "index": { "_index": index } });
        if let Some(id) = id {
            action["index"]["_id"] = Value::String(id);
        }
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&source)?);
        body.push('\n');
    }
    Ok(body)
}

/// Extracts rejected items from a `_bulk` response.
fn bulk_failures(response: &Value) -> Vec<DocumentFailure> {
    if !response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return Vec::new();
    }
    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| item.as_object()?.values().next())
        .filter_map(|result| {
            let error = result.get("error")?;
            let reason = error
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            Some(DocumentFailure {
                id: result.get("_id").and_then(Value::as_str).map(str::to_string),
                reason,
            })
        })
        .collect()
}

fn mapping_payload(dimension: usize) -> Value {
    json!({
        "properties": {
            "vector": {
                "type": "dense_vector",
                "dims": dimension,
                "index": true,
                "similarity": "cosine"
            }
        }
    })
}

#[async_trait]
impl SearchEngine for ElasticsearchEngine {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    fn health_url(&self) -> String {
        format!("{}/_cluster/health", self.host)
    }

    async fn health(&self) -> bool {
        self.http.probe_ok(&self.health_url()).await
    }

    async fn ensure_collection(&self) -> SeedResult<()> {
        let url = self.index_url();
        if let Ok(resp) = self.http.client.head(&url).send().await {
            if resp.status().is_success() {
                info!(index = %self.index, "Index already exists, skipping creation");
                return Ok(());
            }
        }

        info!(index = %self.index, "Creating index");
        let payload = json!({
            "settings": { "index": { "number_of_shards": 1, "number_of_replicas": 0 } }
        });
        let response = self
            .http
            .client
            .put(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SeedError::Deployment(format!("failed to create index: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SeedError::Deployment(format!(
                "failed to create index {} (status {}): {}",
                self.index,
                status,
                truncate(&body, 512)
            )));
        }
        Ok(())
    }

    async fn count(&self) -> SeedResult<u64> {
        let response = self
            .http
            .client
            .get(format!("{}/_count", self.index_url()))
            .query(&[("q", "*:*")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SeedError::CountProbeFailure(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SeedError::CountProbeFailure(e.to_string()))?;

        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn provision_vector_field(&self, dimension: usize) -> SeedResult<Provisioned> {
        let url = format!("{}/_mapping", self.index_url());
        info!(dimension, url = %url, "Creating dense_vector field");

        let response = self
            .http
            .client
            .put(&url)
            .json(&mapping_payload(dimension))
            .send()
            .await
            .map_err(|e| SeedError::SchemaProvisionFailure(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_provision_response(status, &body)
    }

    async fn submit_batch(&self, batch: usize, docs: Vec<Document>) -> SeedResult<BatchReport> {
        let submitted = docs.len();
        let body = bulk_body(&self.index, docs)?;

        let response = self
            .http
            .client
            .post(format!("{}/_bulk", self.host))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| SeedError::transport(batch, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SeedError::transport(
                batch,
                format!("status {}: {}", status, truncate(&text, 512)),
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| SeedError::transport(batch, e))?;
        let failures = bulk_failures(&json);
        for failure in &failures {
            warn!(batch, id = ?failure.id, reason = %failure.reason, "Document rejected");
        }
        debug!(batch, submitted, rejected = failures.len(), "Batch accepted");

        Ok(BatchReport {
            submitted,
            failures,
        })
    }

    fn buffers_writes(&self) -> bool {
        true
    }

    async fn commit(&self) -> SeedResult<()> {
        let response = self
            .http
            .client
            .post(format!("{}/_refresh", self.index_url()))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SeedError::transport(0, format!("refresh failed: {}", e)))?;
        debug!(status = %response.status(), "Index refreshed");
        Ok(())
    }
}
