//! Bulk ingestion into a [`SearchEngine`].
//!
//! Two modes share the same accounting:
//!
//! - **Batched**: the working set is cut into contiguous, order-preserving
//!   batches of `batch_size` documents that are sent one at a time. Each
//!   batch moves `Sending(i/n) → Ok | Failed`; after the last one the
//!   engine is committed once if it buffers writes.
//! - **Streaming**: documents go through a bounded queue drained by a
//!   fixed pool of workers, one request per document. Acknowledgements
//!   may arrive out of order, but `succeeded + failed` always equals the
//!   number of documents handed to the queue.
//!
//! A batch (or document) that cannot be delivered either aborts the run
//! ([`FailureMode::FailFast`]) or is recorded and skipped
//! ([`FailureMode::BestEffort`]). Documents the engine accepted the batch
//! for but rejected individually are always recorded, never fatal.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{FailureMode, IngestConfig, IngestMode};
use crate::engine::SearchEngine;
use crate::error::{SeedError, SeedResult};
use crate::models::{document_id, Document, IngestionOutcome};

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub mode: IngestMode,
    pub batch_size: usize,
    pub on_failure: FailureMode,
    pub workers: usize,
    pub queue_depth: usize,
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig, mode: IngestMode, on_failure: FailureMode) -> Self {
        Self {
            mode,
            batch_size: config.batch_size,
            on_failure,
            workers: config.workers,
            queue_depth: config.queue_depth,
        }
    }
}

/// Index ranges of each batch: `ceil(total / batch_size)` contiguous
/// slices, the last one possibly shorter.
pub fn plan_batches(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..total.div_ceil(batch_size))
        .map(|i| {
            let start = i * batch_size;
            start..(start + batch_size).min(total)
        })
        .collect()
}

/// Sends `docs` using the configured mode.
pub async fn ingest(
    engine: Arc<dyn SearchEngine>,
    docs: Vec<Document>,
    options: &IngestOptions,
) -> SeedResult<IngestionOutcome> {
    if docs.is_empty() {
        info!("No documents provided for indexing");
        return Ok(IngestionOutcome::default());
    }

    let start = Instant::now();
    info!(
        engine = engine.name(),
        documents = docs.len(),
        mode = ?options.mode,
        "Started indexing"
    );

    let mut outcome = match options.mode {
        IngestMode::Batched => ingest_batched(engine.as_ref(), docs, options).await?,
        IngestMode::Streaming => ingest_streaming(engine.clone(), docs, options).await?,
    };

    if engine.buffers_writes() && outcome.succeeded > 0 {
        engine.commit().await?;
        outcome.committed = true;
        info!(engine = engine.name(), "Committed");
    }

    let elapsed = start.elapsed().as_secs_f64();
    if outcome.is_success() {
        info!(
            indexed = outcome.succeeded,
            batches = outcome.batches,
            elapsed_secs = elapsed,
            "Successfully indexed {} documents",
            outcome.succeeded
        );
    } else {
        warn!(
            indexed = outcome.succeeded,
            failed = outcome.failed,
            batches_failed = outcome.batches_failed,
            elapsed_secs = elapsed,
            "Indexing finished degraded: {} of {} documents indexed",
            outcome.succeeded,
            outcome.total
        );
    }
    Ok(outcome)
}

/// Sequential batches, one request in flight.
pub async fn ingest_batched(
    engine: &dyn SearchEngine,
    docs: Vec<Document>,
    options: &IngestOptions,
) -> SeedResult<IngestionOutcome> {
    let total = docs.len();
    let plan = plan_batches(total, options.batch_size);
    let num_batches = plan.len();
    let mut outcome = IngestionOutcome {
        total,
        ..Default::default()
    };

    let mut remaining = docs.into_iter();
    for (i, range) in plan.into_iter().enumerate() {
        let batch_no = i + 1;
        let batch: Vec<Document> = remaining.by_ref().take(range.len()).collect();
        if batch.is_empty() {
            continue;
        }
        let size = batch.len();
        outcome.batches += 1;
        info!("Sending batch {}/{} ({} docs)", batch_no, num_batches, size);

        match engine.submit_batch(batch_no, batch).await {
            Ok(report) => {
                outcome.succeeded += report.succeeded();
                outcome.failed += report.failures.len();
                debug!(batch = batch_no, rejected = report.failures.len(), "Batch done");
            }
            Err(e) => {
                outcome.batches_failed += 1;
                outcome.failed += size;
                match options.on_failure {
                    FailureMode::FailFast => {
                        error!(batch = batch_no, error = %e, "Failed to index batch");
                        return Err(e);
                    }
                    FailureMode::BestEffort => {
                        warn!(batch = batch_no, error = %e, "Failed to index batch, continuing");
                    }
                }
            }
        }
    }

    Ok(outcome)
}

#[derive(Default)]
struct Tally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    aborted: AtomicBool,
    first_error: OnceLock<String>,
}

/// Bounded queue drained by a fixed worker pool.
pub async fn ingest_streaming(
    engine: Arc<dyn SearchEngine>,
    docs: Vec<Document>,
    options: &IngestOptions,
) -> SeedResult<IngestionOutcome> {
    let total = docs.len();
    let (tx, rx) = mpsc::channel::<Document>(options.queue_depth.max(1));
    let rx = Arc::new(Mutex::new(rx));
    let tally = Arc::new(Tally::default());
    let fail_fast = options.on_failure == FailureMode::FailFast;

    let mut workers = JoinSet::new();
    for worker in 0..options.workers.max(1) {
        let engine = engine.clone();
        let rx = rx.clone();
        let tally = tally.clone();
        workers.spawn(async move {
            loop {
                let next = rx.lock().await.recv().await;
                let Some(doc) = next else { break };

                if tally.aborted.load(Ordering::Acquire) {
                    tally.failed.fetch_add(1, Ordering::AcqRel);
                    continue;
                }

                let id = document_id(&doc);
                match engine.submit_document(doc).await {
                    Ok(()) => {
                        tally.succeeded.fetch_add(1, Ordering::AcqRel);
                    }
                    Err(e) => {
                        tally.failed.fetch_add(1, Ordering::AcqRel);
                        error!(worker, id = ?id, error = %e, "Failed to feed document");
                        if fail_fast {
                            let _ = tally.first_error.set(e.transport_reason());
                            tally.aborted.store(true, Ordering::Release);
                        }
                    }
                }
            }
        });
    }

    let mut queued = 0usize;
    for doc in docs {
        if tally.aborted.load(Ordering::Acquire) || tx.send(doc).await.is_err() {
            break;
        }
        queued += 1;
    }
    drop(tx);

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Ingestion worker crashed");
            tally.aborted.store(true, Ordering::Release);
            let _ = tally.first_error.set(format!("worker crashed: {}", e));
        }
    }

    let succeeded = tally.succeeded.load(Ordering::Acquire);
    let failed = tally.failed.load(Ordering::Acquire);
    debug!(queued, succeeded, failed, "Workers drained");

    if fail_fast {
        if let Some(reason) = tally.first_error.get() {
            return Err(SeedError::transport(0, reason));
        }
    }

    Ok(IngestionOutcome {
        total,
        succeeded,
        failed: failed + (total - queued),
        batches: 0,
        batches_failed: 0,
        committed: false,
    })
}
