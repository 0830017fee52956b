//! # Data Ingestion Module
//!
//! ## Purpose
//! Handles the ingestion of German statute documents from the upstream
//! archive into the text store: fetch → parse → change detection → embedding
//! → atomic persistence, with full per-unit accounting.
//!
//! ## Input/Output Specification
//! - **Input**: Legal code identifiers, upstream xml.zip archives
//! - **Output**: Stored text units with embeddings, ingestion reports
//! - **Failure Model**: Per-unit embedding failures are non-fatal; fetch and
//!   parse failures abort only the affected code
//!
//! ## Key Features
//! - Hash-based change detection, idempotent re-ingestion
//! - Batched embedding with retry and per-item failure accounting
//! - Per-code serialization, cross-code parallelism
//!
//! ## Architecture
//! - `sources/`: Upstream document source implementations
//! - `pipeline`: The ingestion pipeline itself

pub mod pipeline;
pub mod sources;

pub use pipeline::{IngestReport, IngestionPipeline};
pub use sources::{DocumentSource, GesetzeImInternetSource, RawDocument};
