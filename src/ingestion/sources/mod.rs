//! # Document Sources Module
//!
//! ## Purpose
//! Defines the common interface for upstream statute sources and provides the
//! gesetze-im-internet.de implementation.
//!
//! ## Input/Output Specification
//! - **Input**: Legal code identifiers (URL slugs)
//! - **Output**: Raw statute XML documents
//! - **Sources**: gesetze-im-internet.de, extensible for future archives
//!
//! ## Architecture
//! - `DocumentSource` trait: Common interface for all sources
//! - `gesetze_im_internet.rs`: The federal statute archive implementation

pub mod gesetze_im_internet;

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use gesetze_im_internet::GesetzeImInternetSource;

/// Raw document fetched from an upstream source, prior to parsing
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Normalized code the document was fetched for
    pub code: String,
    /// Raw document bytes (statute XML)
    pub content: Vec<u8>,
    /// Where the document came from
    pub source_url: String,
    /// Fetch timestamp
    pub fetched_at: DateTime<Utc>,
}

/// Health status of a document source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub is_healthy: bool,
    pub last_check: DateTime<Utc>,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

/// Common interface for upstream statute sources
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Source identifier for logging
    fn name(&self) -> &str;

    /// Fetch the raw document for a legal code.
    ///
    /// Returns `NotFound` when the source has no document for the code;
    /// network failures map to `Network`.
    async fn fetch_document(&self, code: &str) -> Result<RawDocument>;

    /// Check whether the source is reachable
    async fn health_check(&self) -> Result<SourceHealth>;
}
