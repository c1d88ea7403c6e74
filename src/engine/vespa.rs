//! Vespa binding.
//!
//! Vespa needs its application package before the container serves
//! anything, so [`deploy`](SearchEngine::deploy) waits for the config
//! server, zips the package directory in memory and activates it. The
//! vector field is part of that package, which makes vector provisioning
//! a no-op here.
//!
//! Documents are fed one per request through `/document/v1`; batches are
//! just a sequence of single-document writes.

use std::io::{Cursor, Write};
use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{truncate, HttpClients, Provisioned, SearchEngine};
use crate::config::VespaConfig;
use crate::error::{SeedError, SeedResult};
use crate::models::{document_id, split_id, BatchReport, Document, DocumentFailure};
use crate::readiness::ReadinessGate;

pub struct VespaEngine {
    http: HttpClients,
    endpoint: String,
    config: VespaConfig,
}

impl VespaEngine {
    pub(crate) fn new(http: HttpClients, endpoint: String, config: VespaConfig) -> Self {
        Self {
            http,
            endpoint,
            config,
        }
    }

    fn config_endpoint(&self) -> &str {
        self.config.config_endpoint.trim_end_matches('/')
    }

    fn document_url(&self, id: &str) -> SeedResult<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| SeedError::Config(format!("invalid vespa endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SeedError::Config("vespa endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend([
                "document",
                "v1",
                self.config.namespace(),
                self.config.schema.as_str(),
                "docid",
                id,
            ]);
        Ok(url)
    }

    async fn upload_package(&self, app_path: &Path) -> SeedResult<()> {
        info!(path = %app_path.display(), "Zipping application package");
        let package = zip_directory(app_path)?;

        let url = format!(
            "{}/application/v2/tenant/default/prepareandactivate",
            self.config_endpoint()
        );
        info!(url = %url, bytes = package.len(), "Deploying application package");

        let response = self
            .http
            .client
            .post(&url)
            .header("Content-Type", "application/zip")
            .body(package)
            .send()
            .await
            .map_err(|e| SeedError::Deployment(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SeedError::Deployment(format!(
                "status {}: {}",
                status,
                truncate(&body, 512)
            )));
        }
        info!(response = %truncate(&body, 512), "Deployment successful");
        Ok(())
    }
}

/// Zips every file under `root`, named relative to it with `/` separators.
fn zip_directory(root: &Path) -> SeedResult<Vec<u8>> {
    if !root.is_dir() {
        return Err(SeedError::Deployment(format!(
            "application package not found: {}",
            root.display()
        )));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let zip_err = |e: zip::result::ZipError| SeedError::Deployment(e.to_string());

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| SeedError::Deployment(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| SeedError::Deployment(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        writer.start_file(name, options).map_err(zip_err)?;
        writer.write_all(&std::fs::read(entry.path())?)?;
    }

    Ok(writer.finish().map_err(zip_err)?.into_inner())
}

/// Wraps scalar strings in a one-element list for the named fields.
fn coerce_array_fields(doc: &mut Document, fields: &[String]) {
    for field in fields {
        if let Some(value) = doc.get_mut(field) {
            if value.is_string() {
                *value = Value::Array(vec![value.take()]);
            }
        }
    }
}

#[async_trait]
impl SearchEngine for VespaEngine {
    fn name(&self) -> &str {
        "vespa"
    }

    fn health_url(&self) -> String {
        format!("{}/status.html", self.endpoint)
    }

    async fn health(&self) -> bool {
        self.http.probe_ok(&self.health_url()).await
    }

    async fn deploy(&self, gate: &ReadinessGate) -> SeedResult<()> {
        let Some(app_path) = self.config.app_path.as_deref() else {
            debug!("No application package configured, skipping deployment");
            return Ok(());
        };

        let health_url = format!("{}/state/v1/health", self.config_endpoint());
        gate.wait(&health_url, || self.http.probe_ok(&health_url)).await?;
        self.upload_package(app_path).await
    }

    async fn count(&self) -> SeedResult<u64> {
        let response = self
            .http
            .client
            .get(format!("{}/search/", self.endpoint))
            .query(&[("yql", "select * from sources * where true limit 0")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SeedError::CountProbeFailure(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SeedError::CountProbeFailure(e.to_string()))?;

        Ok(body
            .pointer("/root/fields/totalCount")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    async fn provision_vector_field(&self, dimension: usize) -> SeedResult<Provisioned> {
        info!(
            dimension,
            schema = %self.config.schema,
            "Vector field is declared by the application package"
        );
        Ok(Provisioned::AlreadyExists)
    }

    async fn submit_batch(&self, batch: usize, docs: Vec<Document>) -> SeedResult<BatchReport> {
        let mut report = BatchReport {
            submitted: docs.len(),
            failures: Vec::new(),
        };
        for doc in docs {
            let id = document_id(&doc);
            if let Err(e) = self.submit_document(doc).await {
                warn!(batch, id = ?id, error = %e, "Failed to feed document");
                report.failures.push(DocumentFailure {
                    id,
                    reason: e.transport_reason(),
                });
            }
        }
        Ok(report)
    }

    async fn submit_document(&self, doc: Document) -> SeedResult<()> {
        let (id, mut fields) = split_id(doc);
        let id = id.ok_or_else(|| SeedError::transport(0, "document has no id"))?;
        coerce_array_fields(&mut fields, &self.config.array_fields);

        let response = self
            .http
            .client
            .post(self.document_url(&id)?)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .map_err(|e| SeedError::transport(0, e))?;

        let status = response.status();
        if status.is_success() {
            debug!(id = %id, "Indexed document");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SeedError::transport(
            0,
            format!("document {} rejected (status {}): {}", id, status, truncate(&body, 512)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn engine(endpoint: &str) -> VespaEngine {
        let http = HttpClients::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        VespaEngine::new(http, endpoint.to_string(), VespaConfig::default())
    }

    #[test]
    fn document_url_escapes_id() {
        let url = engine("http://vespa:8080").document_url("a b/c").unwrap();
        assert_eq!(
            url.as_str(),
            "http://vespa:8080/document/v1/doc/doc/docid/a%20b%2Fc"
        );
    }

    #[test]
    fn scalar_authors_become_list() {
        let mut doc = json!({"authors": "Jane", "tags": "x"}).as_object().cloned().unwrap();
        coerce_array_fields(&mut doc, &["authors".to_string()]);
        assert_eq!(doc["authors"], json!(["Jane"]));
        assert_eq!(doc["tags"], json!("x"));

        let mut listed = json!({"authors": ["A", "B"]}).as_object().cloned().unwrap();
        coerce_array_fields(&mut listed, &["authors".to_string()]);
        assert_eq!(listed["authors"], json!(["A", "B"]));
    }

    #[test]
    fn package_zip_uses_relative_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("schemas")).unwrap();
        fs::write(tmp.path().join("services.xml"), "<services/>").unwrap();
        fs::write(tmp.path().join("schemas/doc.sd"), "schema doc {}").unwrap();

        let bytes = zip_directory(tmp.path()).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["schemas/doc.sd", "services.xml"]);
    }

    #[test]
    fn missing_package_is_a_deployment_error() {
        let err = zip_directory(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, SeedError::Deployment(_)));
    }
}
