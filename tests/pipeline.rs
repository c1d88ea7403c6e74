//! Pipeline scenarios against an in-memory engine.
//!
//! The engine records every call it receives so the tests can check not
//! just the outcome but the exact sequence of engine operations.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use search_seed::config::{parse_config, Config, EngineKind, FailureMode, IngestMode};
use search_seed::engine::{Provisioned, SearchEngine};
use search_seed::error::{SeedError, SeedResult};
use search_seed::ingest::{ingest, IngestOptions};
use search_seed::models::{document_id, BatchReport, Document, DocumentFailure};
use search_seed::pipeline::{run_seed, SeedReport};
use serde_json::{json, Value};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Count,
    Provision(usize),
    DeleteAll,
    Batch { no: usize, size: usize },
    Document,
    Commit,
}

struct InMemoryEngine {
    healthy: bool,
    count: Option<u64>,
    buffers: bool,
    failing_batches: HashSet<usize>,
    rejected_ids: HashSet<String>,
    provision_fails: bool,
    calls: Mutex<Vec<Call>>,
    stored: Mutex<Vec<Document>>,
}

impl InMemoryEngine {
    fn new() -> Self {
        Self {
            healthy: true,
            count: Some(0),
            buffers: true,
            failing_batches: HashSet::new(),
            rejected_ids: HashSet::new(),
            provision_fails: false,
            calls: Mutex::new(Vec::new()),
            stored: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn stored(&self) -> Vec<Document> {
        self.stored.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    fn name(&self) -> &str {
        "inmemory"
    }

    fn health_url(&self) -> String {
        "memory://health".to_string()
    }

    async fn health(&self) -> bool {
        self.healthy
    }

    async fn count(&self) -> SeedResult<u64> {
        self.record(Call::Count);
        self.count
            .ok_or_else(|| SeedError::CountProbeFailure("connection refused".into()))
    }

    async fn provision_vector_field(&self, dimension: usize) -> SeedResult<Provisioned> {
        self.record(Call::Provision(dimension));
        if self.provision_fails {
            return Err(SeedError::SchemaProvisionFailure(
                "status 400: invalid vectorDimension".into(),
            ));
        }
        Ok(Provisioned::Created)
    }

    async fn delete_all(&self) -> SeedResult<()> {
        self.record(Call::DeleteAll);
        self.stored.lock().unwrap().clear();
        Ok(())
    }

    async fn submit_batch(&self, batch: usize, docs: Vec<Document>) -> SeedResult<BatchReport> {
        self.record(Call::Batch {
            no: batch,
            size: docs.len(),
        });
        if self.failing_batches.contains(&batch) {
            return Err(SeedError::transport(batch, "connection reset"));
        }
        let submitted = docs.len();
        let mut failures = Vec::new();
        for doc in docs {
            let id = document_id(&doc);
            if id.as_ref().is_some_and(|id| self.rejected_ids.contains(id)) {
                failures.push(DocumentFailure {
                    id,
                    reason: "rejected".into(),
                });
            } else {
                self.stored.lock().unwrap().push(doc);
            }
        }
        Ok(BatchReport {
            submitted,
            failures,
        })
    }

    async fn submit_document(&self, doc: Document) -> SeedResult<()> {
        self.record(Call::Document);
        let id = document_id(&doc).unwrap_or_default();
        if self.rejected_ids.contains(&id) {
            return Err(SeedError::transport(0, format!("{} rejected", id)));
        }
        self.stored.lock().unwrap().push(doc);
        Ok(())
    }

    fn buffers_writes(&self) -> bool {
        self.buffers
    }

    async fn commit(&self) -> SeedResult<()> {
        self.record(Call::Commit);
        Ok(())
    }
}

fn docs(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| doc(json!({ "id": format!("d{i}"), "title": format!("Doc {i}") })))
        .collect()
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn write_dataset(dir: &Path, docs: &[Document]) -> std::path::PathBuf {
    let path = dir.join("dataset.json");
    fs::write(&path, serde_json::to_string(docs).unwrap()).unwrap();
    path
}

fn write_embeddings(dir: &Path, lines: &[Value]) -> std::path::PathBuf {
    let path = dir.join("documents_embeddings.jsonl");
    let body: Vec<String> = lines.iter().map(Value::to_string).collect();
    fs::write(&path, body.join("\n")).unwrap();
    path
}

fn config(dir: &Path, extra: &str) -> Config {
    let content = format!(
        r#"
[engine]
kind = "solr"
endpoint = "http://localhost:8983/solr/testcore"

[dataset]
path = "{dir}/dataset.json"
embeddings_path = "{dir}/documents_embeddings.jsonl"
merged_path = "{dir}/merged_dataset.json"

[readiness]
timeout_secs = 1
poll_interval_ms = 100

{extra}
"#,
        dir = dir.display(),
        extra = extra
    );
    parse_config(&content).unwrap()
}

fn options(mode: IngestMode, batch_size: usize, on_failure: FailureMode) -> IngestOptions {
    IngestOptions {
        mode,
        batch_size,
        on_failure,
        workers: 4,
        queue_depth: 8,
    }
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_join_attaches_single_vector() {
    let tmp = TempDir::new().unwrap();
    write_dataset(
        tmp.path(),
        &[doc(json!({"id": "a"})), doc(json!({"id": "b"})), doc(json!({"id": "c"}))],
    );
    write_embeddings(tmp.path(), &[json!({"id": "a", "vector": [0.1, 0.2]})]);

    let engine = Arc::new(InMemoryEngine::new());
    let report = run_seed(&config(tmp.path(), ""), engine.clone()).await.unwrap();

    let stored = engine.stored();
    let ids: Vec<_> = stored.iter().map(|d| d["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(stored[0]["vector"], json!([0.1, 0.2]));
    assert!(!stored[1].contains_key("vector"));
    assert!(!stored[2].contains_key("vector"));
    assert!(matches!(
        report,
        SeedReport::Ingested {
            dimension: Some(2),
            ..
        }
    ));
}

#[tokio::test]
async fn scenario_b_empty_dataset_makes_no_calls() {
    let engine = Arc::new(InMemoryEngine::new());
    let outcome = ingest(
        engine.clone(),
        Vec::new(),
        &options(IngestMode::Batched, 1000, FailureMode::FailFast),
    )
    .await
    .unwrap();

    assert_eq!(outcome.total, 0);
    assert!(outcome.is_success());
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn scenario_c_empty_engine_runs_full_pipeline() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &docs(5));
    write_embeddings(
        tmp.path(),
        &[
            json!({"id": "d0", "vector": [0.5, 0.25, 0.125]}),
            json!({"id": "d3", "vector": [1.0, 0.0, 0.0]}),
        ],
    );

    let engine = Arc::new(InMemoryEngine::new());
    let report = run_seed(&config(tmp.path(), ""), engine.clone()).await.unwrap();

    assert_eq!(
        engine.calls(),
        vec![
            Call::Count,
            Call::Provision(3),
            Call::Batch { no: 1, size: 5 },
            Call::Commit
        ]
    );
    match report {
        SeedReport::Ingested { outcome, .. } => {
            assert_eq!(outcome.total, 5);
            assert_eq!(outcome.succeeded, 5);
            assert!(outcome.committed);
        }
        other => panic!("unexpected report: {other:?}"),
    }
    assert!(tmp.path().join("merged_dataset.json").exists());
}

#[tokio::test]
async fn scenario_d_readiness_timeout_before_dataset_load() {
    let tmp = TempDir::new().unwrap();
    // No dataset written: a load attempt would surface DatasetNotFound.
    let mut engine = InMemoryEngine::new();
    engine.healthy = false;
    let engine = Arc::new(engine);

    let err = run_seed(&config(tmp.path(), ""), engine.clone())
        .await
        .unwrap_err();

    match err {
        SeedError::ReadinessTimeout { url, .. } => assert_eq!(url, "memory://health"),
        other => panic!("expected readiness timeout, got {other}"),
    }
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn scenario_e_three_batches_single_commit() {
    let engine = Arc::new(InMemoryEngine::new());
    let outcome = ingest(
        engine.clone(),
        docs(2500),
        &options(IngestMode::Batched, 1000, FailureMode::FailFast),
    )
    .await
    .unwrap();

    assert_eq!(
        engine.calls(),
        vec![
            Call::Batch { no: 1, size: 1000 },
            Call::Batch { no: 2, size: 1000 },
            Call::Batch { no: 3, size: 500 },
            Call::Commit
        ]
    );
    assert_eq!(outcome.batches, 3);
    assert_eq!(outcome.succeeded, 2500);
}

// ─── Skip rule and policies ─────────────────────────────────────────

#[tokio::test]
async fn populated_engine_is_skipped() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &docs(3));
    let mut engine = InMemoryEngine::new();
    engine.count = Some(42);
    let engine = Arc::new(engine);

    let report = run_seed(&config(tmp.path(), ""), engine.clone()).await.unwrap();

    assert_eq!(report, SeedReport::Skipped { existing: 42 });
    assert_eq!(engine.calls(), vec![Call::Count]);
}

#[tokio::test]
async fn force_reindex_deletes_then_ingests() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &docs(3));
    let mut engine = InMemoryEngine::new();
    engine.count = Some(42);
    let engine = Arc::new(engine);

    let cfg = config(tmp.path(), "[ingest]\nforce_reindex = true\n");
    run_seed(&cfg, engine.clone()).await.unwrap();

    assert_eq!(
        engine.calls(),
        vec![
            Call::Count,
            Call::DeleteAll,
            Call::Batch { no: 1, size: 3 },
            Call::Commit
        ]
    );
}

#[tokio::test]
async fn force_reindex_with_empty_dataset_keeps_existing_documents() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &[]);
    let mut engine = InMemoryEngine::new();
    engine.count = Some(500);
    let engine = Arc::new(engine);

    let cfg = config(tmp.path(), "[ingest]\nforce_reindex = true\n");
    let report = run_seed(&cfg, engine.clone()).await.unwrap();

    assert_eq!(engine.calls(), vec![Call::Count]);
    match report {
        SeedReport::Ingested { outcome, .. } => assert_eq!(outcome.total, 0),
        other => panic!("unexpected report: {other:?}"),
    }
}

#[tokio::test]
async fn strict_provisioning_failure_aborts_before_ingest() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &docs(3));
    write_embeddings(tmp.path(), &[json!({"id": "d0", "vector": [0.1, 0.2]})]);
    let mut engine = InMemoryEngine::new();
    engine.provision_fails = true;
    let engine = Arc::new(engine);

    let err = run_seed(&config(tmp.path(), ""), engine.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, SeedError::SchemaProvisionFailure(_)));
    assert_eq!(engine.calls(), vec![Call::Count, Call::Provision(2)]);
    assert!(engine.stored().is_empty());
}

#[tokio::test]
async fn lenient_provisioning_failure_still_ingests() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &docs(3));
    write_embeddings(tmp.path(), &[json!({"id": "d0", "vector": [0.1, 0.2]})]);
    let mut engine = InMemoryEngine::new();
    engine.provision_fails = true;
    let engine = Arc::new(engine);

    let cfg = config(tmp.path(), "[policy]\nprovisioning = \"lenient\"\n");
    let report = run_seed(&cfg, engine.clone()).await.unwrap();

    assert!(matches!(report, SeedReport::Ingested { dimension: Some(2), .. }));
    assert_eq!(
        engine.calls(),
        vec![
            Call::Count,
            Call::Provision(2),
            Call::Batch { no: 1, size: 3 },
            Call::Commit
        ]
    );
    assert_eq!(engine.stored().len(), 3);
}

#[tokio::test]
async fn lenient_count_failure_is_treated_as_empty() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &docs(2));
    let mut engine = InMemoryEngine::new();
    engine.count = None;
    let engine = Arc::new(engine);

    let report = run_seed(&config(tmp.path(), ""), engine.clone()).await.unwrap();
    assert!(matches!(report, SeedReport::Ingested { .. }));
    assert_eq!(engine.stored().len(), 2);
}

#[tokio::test]
async fn strict_count_failure_aborts() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &docs(2));
    let mut engine = InMemoryEngine::new();
    engine.count = None;
    let engine = Arc::new(engine);

    let cfg = config(tmp.path(), "[policy]\ncount_probe = \"strict\"\n");
    let err = run_seed(&cfg, engine.clone()).await.unwrap_err();
    assert!(matches!(err, SeedError::CountProbeFailure(_)));
    assert!(engine.stored().is_empty());
}

#[tokio::test]
async fn no_embeddings_skips_provisioning_and_removes_scratch() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &docs(2));
    let scratch = tmp.path().join("merged_dataset.json");
    fs::write(&scratch, "[]").unwrap();

    let engine = Arc::new(InMemoryEngine::new());
    let report = run_seed(&config(tmp.path(), ""), engine.clone()).await.unwrap();

    assert!(!engine.calls().iter().any(|c| matches!(c, Call::Provision(_))));
    assert!(!scratch.exists());
    assert!(matches!(report, SeedReport::Ingested { dimension: None, .. }));
}

#[tokio::test]
async fn dimension_validation_rejects_mixed_lengths() {
    let tmp = TempDir::new().unwrap();
    write_dataset(tmp.path(), &docs(2));
    write_embeddings(
        tmp.path(),
        &[
            json!({"id": "d0", "vector": [0.1, 0.2]}),
            json!({"id": "d1", "vector": [0.1]}),
        ],
    );

    let engine = Arc::new(InMemoryEngine::new());
    let cfg = config(tmp.path(), "[policy]\nvalidate_dimensions = true\n");
    let err = run_seed(&cfg, engine.clone()).await.unwrap_err();

    assert!(matches!(err, SeedError::DimensionMismatch { expected: 2, .. }));
    assert!(engine.stored().is_empty());
}

// ─── Failure isolation ──────────────────────────────────────────────

#[tokio::test]
async fn fail_fast_stops_at_first_failed_batch() {
    let mut engine = InMemoryEngine::new();
    engine.failing_batches.insert(2);
    let engine = Arc::new(engine);

    let err = ingest(
        engine.clone(),
        docs(25),
        &options(IngestMode::Batched, 10, FailureMode::FailFast),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SeedError::BatchTransportFailure { batch: 2, .. }));
    assert_eq!(
        engine.calls(),
        vec![Call::Batch { no: 1, size: 10 }, Call::Batch { no: 2, size: 10 }]
    );
}

#[tokio::test]
async fn best_effort_continues_and_reports_degraded() {
    let mut engine = InMemoryEngine::new();
    engine.failing_batches.insert(2);
    engine.rejected_ids.insert("d24".to_string());
    let engine = Arc::new(engine);

    let outcome = ingest(
        engine.clone(),
        docs(25),
        &options(IngestMode::Batched, 10, FailureMode::BestEffort),
    )
    .await
    .unwrap();

    assert_eq!(outcome.total, 25);
    assert_eq!(outcome.batches, 3);
    assert_eq!(outcome.batches_failed, 1);
    assert_eq!(outcome.failed, 11);
    assert_eq!(outcome.succeeded, 14);
    assert!(!outcome.is_success());
    assert_eq!(engine.calls().last(), Some(&Call::Commit));
}

#[tokio::test]
async fn unbuffered_engine_is_not_committed() {
    let mut engine = InMemoryEngine::new();
    engine.buffers = false;
    let engine = Arc::new(engine);

    let outcome = ingest(
        engine.clone(),
        docs(3),
        &options(IngestMode::Batched, 2, FailureMode::FailFast),
    )
    .await
    .unwrap();

    assert!(!outcome.committed);
    assert!(!engine.calls().contains(&Call::Commit));
}

// ─── Streaming mode ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn streaming_tally_matches_submitted() {
    let mut engine = InMemoryEngine::new();
    engine.buffers = false;
    for i in [3, 17, 99] {
        engine.rejected_ids.insert(format!("d{i}"));
    }
    let engine = Arc::new(engine);

    let outcome = ingest(
        engine.clone(),
        docs(200),
        &options(IngestMode::Streaming, 1000, FailureMode::BestEffort),
    )
    .await
    .unwrap();

    assert_eq!(outcome.total, 200);
    assert_eq!(outcome.succeeded, 197);
    assert_eq!(outcome.failed, 3);
    assert_eq!(outcome.succeeded + outcome.failed, outcome.total);

    let mut stored: Vec<String> = engine
        .stored()
        .iter()
        .map(|d| d["id"].as_str().unwrap().to_string())
        .collect();
    stored.sort();
    stored.dedup();
    assert_eq!(stored.len(), 197);
    assert_eq!(
        engine.calls().iter().filter(|c| **c == Call::Document).count(),
        200
    );
}

#[tokio::test]
async fn streaming_fail_fast_surfaces_error() {
    let mut engine = InMemoryEngine::new();
    engine.rejected_ids.insert("d0".to_string());
    let engine = Arc::new(engine);

    let err = ingest(
        engine.clone(),
        docs(50),
        &options(IngestMode::Streaming, 1000, FailureMode::FailFast),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SeedError::BatchTransportFailure { .. }));
    assert!(!engine.calls().contains(&Call::Commit));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn vespa_defaults_keep_feeding_past_rejected_documents() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = config(tmp.path(), "");
    cfg.engine.kind = EngineKind::Vespa;

    let mut engine = InMemoryEngine::new();
    engine.buffers = false;
    engine.rejected_ids.insert("d4".to_string());
    let engine = Arc::new(engine);

    let options = IngestOptions::from_config(&cfg.ingest, cfg.ingest_mode(), cfg.failure_mode());
    let outcome = ingest(engine.clone(), docs(10), &options).await.unwrap();

    assert_eq!(options.mode, IngestMode::Streaming);
    assert_eq!(outcome.succeeded, 9);
    assert_eq!(outcome.failed, 1);
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn streaming_failure_reason_is_not_rewrapped() {
    let mut engine = InMemoryEngine::new();
    engine.rejected_ids.insert("d0".to_string());
    let engine = Arc::new(engine);

    let err = ingest(
        engine,
        docs(1),
        &options(IngestMode::Streaming, 1000, FailureMode::FailFast),
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "batch 0 failed: d0 rejected");
}
