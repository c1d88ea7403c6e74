use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Solr,
    Elasticsearch,
    Vespa,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Solr => "solr",
            EngineKind::Elasticsearch => "elasticsearch",
            EngineKind::Vespa => "vespa",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Solr core URL, Elasticsearch host, or Vespa container URL.
    pub endpoint: String,
    /// Elasticsearch index name.
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default)]
    pub vespa: VespaConfig,
}

fn default_index_name() -> String {
    "testcore".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct VespaConfig {
    #[serde(default = "default_vespa_config_endpoint")]
    pub config_endpoint: String,
    /// Application package directory deployed before feeding. Deployment
    /// is skipped when unset.
    #[serde(default)]
    pub app_path: Option<PathBuf>,
    #[serde(default = "default_vespa_schema")]
    pub schema: String,
    /// Defaults to the schema name.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Fields that must be arrays; a scalar string is wrapped in a list.
    #[serde(default = "default_array_fields")]
    pub array_fields: Vec<String>,
}

impl Default for VespaConfig {
    fn default() -> Self {
        Self {
            config_endpoint: default_vespa_config_endpoint(),
            app_path: None,
            schema: default_vespa_schema(),
            namespace: None,
            array_fields: default_array_fields(),
        }
    }
}

impl VespaConfig {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(&self.schema)
    }
}

fn default_vespa_config_endpoint() -> String {
    "http://vespa:19071".to_string()
}
fn default_vespa_schema() -> String {
    "doc".to_string()
}
fn default_array_fields() -> Vec<String> {
    vec!["authors".to_string()]
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    /// Sniff the first non-whitespace byte: `[` means a JSON array.
    #[default]
    Auto,
    Jsonl,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: DatasetFormat,
    #[serde(default)]
    pub embeddings_path: Option<PathBuf>,
    /// Scratch file receiving the vector-joined dataset.
    #[serde(default)]
    pub merged_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReadinessConfig {
    #[serde(default = "default_readiness_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_readiness_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

fn default_readiness_timeout_secs() -> u64 {
    600
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_attempt_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Sequential fixed-size batches, one request in flight.
    Batched,
    /// Bounded queue drained by a worker pool, one document per request.
    Streaming,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    FailFast,
    BestEffort,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_ingest_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub force_reindex: bool,
    /// Defaults per engine: streaming for Vespa, batched otherwise.
    #[serde(default)]
    pub mode: Option<IngestMode>,
    /// Defaults per engine: best effort for Vespa, fail fast otherwise.
    #[serde(default)]
    pub on_batch_failure: Option<FailureMode>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_secs: default_ingest_timeout_secs(),
            force_reindex: false,
            mode: None,
            on_batch_failure: None,
            workers: default_workers(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl IngestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_batch_size() -> usize {
    1000
}
fn default_ingest_timeout_secs() -> u64 {
    600
}
fn default_workers() -> usize {
    16
}
fn default_queue_depth() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Lenient,
    Strict,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PolicyConfig {
    /// `lenient` treats a failed count as zero; `strict` aborts the run.
    /// Defaults per engine when unset.
    #[serde(default)]
    pub count_probe: Option<Strictness>,
    /// `strict` aborts when the vector field cannot be created;
    /// `lenient` logs and lets the bulk writes fail downstream.
    #[serde(default)]
    pub provisioning: Option<Strictness>,
    /// Check every vector against the sampled dimension before provisioning.
    #[serde(default)]
    pub validate_dimensions: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn ingest_mode(&self) -> IngestMode {
        self.ingest.mode.unwrap_or(match self.engine.kind {
            EngineKind::Vespa => IngestMode::Streaming,
            EngineKind::Solr | EngineKind::Elasticsearch => IngestMode::Batched,
        })
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.ingest.on_batch_failure.unwrap_or(match self.engine.kind {
            EngineKind::Vespa => FailureMode::BestEffort,
            EngineKind::Solr | EngineKind::Elasticsearch => FailureMode::FailFast,
        })
    }

    pub fn count_probe_policy(&self) -> Strictness {
        self.policy.count_probe.unwrap_or(match self.engine.kind {
            EngineKind::Vespa => Strictness::Strict,
            EngineKind::Solr | EngineKind::Elasticsearch => Strictness::Lenient,
        })
    }

    pub fn provisioning_policy(&self) -> Strictness {
        self.policy.provisioning.unwrap_or(Strictness::Strict)
    }

    /// Checks the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.engine.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            anyhow::bail!("engine.endpoint must be an http(s) URL, got '{}'", endpoint);
        }
        if self.engine.kind == EngineKind::Elasticsearch && self.engine.index_name.trim().is_empty()
        {
            anyhow::bail!("engine.index_name must not be empty for elasticsearch");
        }
        if self.ingest.batch_size == 0 {
            anyhow::bail!("ingest.batch_size must be > 0");
        }
        if self.ingest.workers == 0 {
            anyhow::bail!("ingest.workers must be > 0");
        }
        if self.ingest.queue_depth == 0 {
            anyhow::bail!("ingest.queue_depth must be > 0");
        }
        if self.readiness.poll_interval_ms == 0 {
            anyhow::bail!("readiness.poll_interval_ms must be > 0");
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
