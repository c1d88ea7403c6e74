//! # Search Seed
//!
//! Seeds a search engine (Solr, Elasticsearch or Vespa) with a dataset on
//! container startup, merging optional precomputed embedding vectors into
//! the documents before indexing.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Readiness  │──▶│   Count    │──▶│ Join vectors │──▶│ Batch ingest │
//! │   gate     │   │   probe    │   │ + provision  │   │  + commit    │
//! └────────────┘   └────────────┘   └──────────────┘   └──────┬───────┘
//!                                                             ▼
//!                                             ┌───────────────────────────┐
//!                                             │ SearchEngine              │
//!                                             │ Solr / Elasticsearch /    │
//!                                             │ Vespa                     │
//!                                             └───────────────────────────┘
//! ```
//!
//! A run is idempotent: an engine that already holds documents is left
//! alone unless `force_reindex` is set.
//!
//! ## Quick Start
//!
//! ```bash
//! seed --config ./config/seed.toml run
//! seed --config ./config/seed.toml run --force-reindex
//! seed --config ./config/seed.toml status
//! seed --config ./config/seed.toml merge
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, embedding index, outcomes |
//! | [`dataset`] | Dataset and embedding file loaders |
//! | [`join`] | Vector join and rounding |
//! | [`readiness`] | Wait-until-healthy gate |
//! | [`engine`] | Engine trait and the three bindings |
//! | [`ingest`] | Batched and streaming bulk ingestion |
//! | [`pipeline`] | Run orchestration |
//! | [`error`] | Error taxonomy |
//! | [`logging`] | Log subscriber setup |

pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod join;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod readiness;
