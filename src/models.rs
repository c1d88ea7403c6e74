//! Core data models that flow through the seeding pipeline.
//!
//! Documents are kept as loose JSON objects: the seeder never interprets
//! fields other than `id` and `vector`, and each engine decides how the
//! id is routed on the wire.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// A dataset record. Must carry an `id` (string or string-coercible).
pub type Document = Map<String, Value>;

/// Name of the dense vector field attached by the joiner.
pub const VECTOR_FIELD: &str = "vector";

/// Returns the document's id coerced to a string.
///
/// Strings are used as-is, numbers and booleans are rendered with their
/// JSON text. `null`, arrays and objects are not valid ids.
pub fn document_id(doc: &Document) -> Option<String> {
    match doc.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Removes `id` from the document and returns it alongside the remaining
/// fields, for engines that route by key rather than index the id.
///
/// An `id` that cannot be used as a key stays in the fields.
pub fn split_id(mut doc: Document) -> (Option<String>, Document) {
    let id = document_id(&doc);
    if id.is_some() {
        doc.remove("id");
    } else if let Some(raw) = doc.get("id") {
        warn!(id = %raw, "Document id is not usable as a key");
    }
    (id, doc)
}

/// Document id to embedding vector, built once per run.
///
/// Remembers the first id inserted so the embedding dimension does not
/// depend on hash-map iteration order.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    vectors: HashMap<String, Vec<f64>>,
    first_id: Option<String>,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a vector. A later vector for the same id replaces the
    /// earlier one.
    pub fn insert(&mut self, id: String, vector: Vec<f64>) {
        if self.first_id.is_none() {
            self.first_id = Some(id.clone());
        }
        self.vectors.insert(id, vector);
    }

    pub fn get(&self, id: &str) -> Option<&[f64]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Length of the current vector of the first loaded id; `None` when
    /// empty.
    pub fn dimension(&self) -> Option<usize> {
        let first = self.first_id.as_deref()?;
        self.vectors.get(first).map(Vec::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<f64>)> {
        self.vectors.iter()
    }
}

impl FromIterator<(String, Vec<f64>)> for EmbeddingIndex {
    fn from_iter<I: IntoIterator<Item = (String, Vec<f64>)>>(iter: I) -> Self {
        let mut index = EmbeddingIndex::new();
        for (id, vector) in iter {
            index.insert(id, vector);
        }
        index
    }
}

/// One rejected document inside an otherwise delivered batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub id: Option<String>,
    pub reason: String,
}

/// Outcome of a single `submit_batch` call that reached the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub submitted: usize,
    pub failures: Vec<DocumentFailure>,
}

impl BatchReport {
    pub fn all_ok(submitted: usize) -> Self {
        Self {
            submitted,
            failures: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.submitted.saturating_sub(self.failures.len())
    }
}

/// Aggregate counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batches: usize,
    pub batches_failed: usize,
    pub committed: bool,
}

impl IngestionOutcome {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.batches_failed == 0
    }
}
