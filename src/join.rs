//! Joins precomputed embeddings into the dataset.
//!
//! The join is a pure transform: every input document appears in the
//! output exactly once, in the same position, shallow-copied. Documents
//! whose id has an embedding gain a `vector` field; all others are left
//! untouched (no zero vector is invented).

use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{Number, Value};
use tracing::{debug, info};

use crate::error::{SeedError, SeedResult};
use crate::models::{document_id, Document, EmbeddingIndex, VECTOR_FIELD};

/// Decimal digits kept on every vector component.
pub const VECTOR_PRECISION: i32 = 12;

/// Rounds `x` to `digits` decimal places.
///
/// Values too large for the scaled form to hold a fractional part are
/// returned unchanged, as are non-finite values.
pub fn round_component(x: f64, digits: i32) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let scale = 10f64.powi(digits);
    let scaled = x * scale;
    if !scaled.is_finite() || scaled.abs() >= 4_503_599_627_370_496.0 {
        return x;
    }
    scaled.round() / scale
}

pub fn round_vector(vector: &[f64], digits: i32) -> Vec<f64> {
    vector.iter().map(|&x| round_component(x, digits)).collect()
}

/// Returns a new document sequence with vectors attached by id.
pub fn join(docs: &[Document], embeddings: &EmbeddingIndex) -> Vec<Document> {
    let mut matched = 0usize;
    let merged: Vec<Document> = docs
        .iter()
        .map(|original| {
            let mut doc = original.clone();
            let Some(id) = document_id(&doc) else {
                debug!("Document missing id");
                return doc;
            };
            if let Some(vector) = embeddings.get(&id) {
                doc.insert(VECTOR_FIELD.to_string(), vector_value(vector));
                matched += 1;
            }
            doc
        })
        .collect();

    info!(
        documents = merged.len(),
        with_vectors = matched,
        "Merged embeddings into dataset"
    );
    merged
}

fn vector_value(vector: &[f64]) -> Value {
    Value::Array(
        round_vector(vector, VECTOR_PRECISION)
            .into_iter()
            .map(|x| Number::from_f64(x).map_or(Value::Null, Value::Number))
            .collect(),
    )
}

/// Checks every vector against the sampled dimension.
pub fn validate_dimensions(embeddings: &EmbeddingIndex) -> SeedResult<Option<usize>> {
    let Some(expected) = embeddings.dimension() else {
        return Ok(None);
    };
    for (id, vector) in embeddings.iter() {
        if vector.len() != expected {
            return Err(SeedError::DimensionMismatch {
                id: id.clone(),
                expected,
                actual: vector.len(),
            });
        }
    }
    Ok(Some(expected))
}

/// Writes the merged dataset as one JSON array.
pub fn write_merged(path: &Path, docs: &[Document]) -> SeedResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer(&mut writer, docs)?;
    writer.flush()?;
    info!(path = %path.display(), "Wrote merged dataset");
    Ok(())
}
