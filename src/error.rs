//! Error taxonomy for the seeding pipeline.
//!
//! Every engine binding translates transport failures into one of these
//! kinds at its boundary, so nothing past an engine call ever sees a raw
//! `reqwest::Error`. Which kinds are fatal is decided by the pipeline and
//! the configured policies, not by the bindings.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    /// The engine never answered its health check inside the budget.
    #[error("{url} did not become ready after {:.1}s", .elapsed.as_secs_f64())]
    ReadinessTimeout { url: String, elapsed: Duration },

    #[error("dataset file not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("dataset {} is malformed: {reason}", .path.display())]
    DatasetMalformed { path: PathBuf, reason: String },

    #[error("embeddings file {} could not be read: {source}", .path.display())]
    EmbeddingsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Only raised when `policy.validate_dimensions` is enabled.
    #[error("embedding for '{id}' has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to provision vector field: {0}")]
    SchemaProvisionFailure(String),

    #[error("batch {batch} failed: {reason}")]
    BatchTransportFailure { batch: usize, reason: String },

    #[error("document count probe failed: {0}")]
    CountProbeFailure(String),

    #[error("deployment failed: {0}")]
    Deployment(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type SeedResult<T> = Result<T, SeedError>;

impl SeedError {
    /// Wraps an error from one document or batch submission.
    pub fn transport(batch: usize, reason: impl std::fmt::Display) -> Self {
        SeedError::BatchTransportFailure {
            batch,
            reason: reason.to_string(),
        }
    }

    /// The bare failure reason, without the `batch N failed:` prefix, so
    /// it can be re-wrapped or recorded per document.
    pub fn transport_reason(&self) -> String {
        match self {
            SeedError::BatchTransportFailure { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}
