//! # German Legal Text Store
//!
//! ## Overview
//! This library implements an ingestion and retrieval engine for German
//! federal statutes published on gesetze-im-internet.de. Statutes are split
//! into addressable units (code → section → sub-section → text), embedded via
//! an external embedding model, and served through exact structural lookup
//! and semantic nearest-neighbor search.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `parser`: Turns raw statute XML into an ordered sequence of text units
//! - `text_processing`: Whitespace normalization, content hashing, markers
//! - `embedding`: Embedding model client with batching and retry policy
//! - `ingestion`: Document sources and the fetch → parse → embed → persist pipeline
//! - `storage`: Durable unit storage with exact and nearest-neighbor queries
//! - `search`: Retrieval service composing storage and embedding queries
//! - `catalog`: Read-only reference data about known legal codes
//! - `api`: REST API endpoints
//! - `config`: Configuration management and settings
//! - `errors`: Centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Statute XML archives (xml.zip), structural and text queries
//! - **Output**: Text units with similarity scores, ingestion reports
//! - **Guarantees**: Idempotent re-ingestion, deterministic result ordering
//!
//! ## Usage
//! ```rust,no_run
//! use legal_text_store::{Config, RetrievalService, TextStore};
//! use legal_text_store::embedding::OllamaEmbeddingClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.toml")?;
//!     let store = Arc::new(TextStore::open(
//!         &config.storage,
//!         &config.embedding.model,
//!         config.embedding.dimension,
//!     )?);
//!     let embedder = Arc::new(OllamaEmbeddingClient::new(&config.embedding)?);
//!     let retrieval = RetrievalService::new(store, embedder);
//!     let results = retrieval.query("bgb", Some("§ 1"), None).await?;
//!     println!("Found {} units", results.len());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod api;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod ingestion;
pub mod parser;
pub mod search;
pub mod storage;
pub mod text_processing;

// Re-exports for convenience
pub use config::Config;
pub use errors::{Result, StoreError};
pub use ingestion::{IngestReport, IngestionPipeline};
pub use search::{RetrievalService, SearchOptions};
pub use storage::TextStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Addressable identity of a text unit within the store.
///
/// `sub_section = None` denotes whole-section granularity; a stored key never
/// contains `Some("")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    /// Lowercase identifier of the legal code (URL slug, e.g. "bgb")
    pub code: String,
    /// Section heading, e.g. "§ 433"
    pub section: String,
    /// Optional sub-section heading, e.g. "1" or "2a"
    pub sub_section: Option<String>,
}

impl UnitKey {
    pub fn new(
        code: impl Into<String>,
        section: impl Into<String>,
        sub_section: Option<String>,
    ) -> Self {
        Self {
            code: code.into(),
            section: section.into(),
            sub_section,
        }
    }
}

impl std::fmt::Display for UnitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sub_section {
            Some(sub) => write!(f, "{}/{}/{}", self.code, self.section, sub),
            None => write!(f, "{}/{}", self.code, self.section),
        }
    }
}

/// The atomic retrievable item: one addressable passage of a statute together
/// with its embedding state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    /// Stable identity, assigned on first insert and preserved across updates
    pub id: Uuid,
    /// Lowercase code identifier (from the source URL, not the XML jurabk)
    pub code: String,
    /// Section heading
    pub section: String,
    /// Optional sub-section heading; `None` means whole-section granularity
    pub sub_section: Option<String>,
    /// Normalized body text
    pub text: String,
    /// Hex SHA-256 of the normalized text, used for change detection
    pub content_hash: String,
    /// Embedding vector; absent until embedding has succeeded
    pub embedding: Option<Vec<f32>>,
    /// Embedding model identifier the vector was produced with
    pub model_version: String,
    /// Document-order index within the code, drives deterministic ordering
    pub position: u32,
    /// First-insert timestamp
    pub ingested_at: DateTime<Utc>,
    /// Last-update timestamp
    pub updated_at: DateTime<Utc>,
}

impl TextUnit {
    /// The unit's addressable key
    pub fn key(&self) -> UnitKey {
        UnitKey {
            code: self.code.clone(),
            section: self.section.clone(),
            sub_section: self.sub_section.clone(),
        }
    }
}

/// Application state shared across API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<TextStore>,
    pub retrieval: Arc<RetrievalService>,
    pub pipeline: Arc<IngestionPipeline>,
    pub catalog: Arc<catalog::Catalog>,
}
