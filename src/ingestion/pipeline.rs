//! # Ingestion Pipeline
//!
//! ## Purpose
//! Orchestrates the complete ingestion workflow for one legal code: fetch the
//! raw document, parse it into units, detect changes against the store, embed
//! new or changed units, and persist each unit atomically.
//!
//! ## Input/Output Specification
//! - **Input**: Legal code identifiers
//! - **Output**: `IngestReport` with created/updated/unchanged/failed counts
//! - **Workflow**: Fetch → Parse → Diff → Embed → Store
//!
//! ## Failure Semantics
//! - Fetch and parse failures abort ingestion for the affected code only
//! - Embedding failures are per-unit: the unit is reported as failed and its
//!   prior state is preserved; ingestion continues for the remaining units
//! - Re-running with no upstream change yields an all-unchanged report
//!
//! ## Concurrency
//! At most one ingestion per code runs at a time (later calls for the same
//! code wait); different codes proceed in parallel. Within a run, embedding
//! batches are issued with bounded concurrency by the batch embedder.

use crate::embedding::BatchEmbedder;
use crate::errors::{Result, StoreError};
use crate::ingestion::sources::DocumentSource;
use crate::parser::DocumentParser;
use crate::storage::TextStore;
use crate::text_processing::{content_hash, normalize_code};
use crate::TextUnit;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Accounting for one ingestion run of one code
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestReport {
    /// The ingested code
    pub code: String,
    /// Units inserted for the first time
    pub created: usize,
    /// Units whose content changed and was re-embedded
    pub updated: usize,
    /// Units skipped because content and embedding were already current
    pub unchanged: usize,
    /// Units whose embedding failed after the retry ceiling
    pub failed: usize,
    /// Non-fatal parser warnings collected during the run
    pub warnings: Vec<String>,
    /// Per-unit failure details
    pub failures: Vec<String>,
}

impl IngestReport {
    /// Total number of units seen in the upstream document
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.failed
    }
}

/// Unit scheduled for embedding, with its origin recorded for accounting
struct PendingUnit {
    unit: TextUnit,
    is_new: bool,
}

/// Main ingestion pipeline
pub struct IngestionPipeline {
    source: Arc<dyn DocumentSource>,
    parser: DocumentParser,
    embedder: BatchEmbedder,
    store: Arc<TextStore>,
    /// Per-code ingestion locks; entries are created on first use
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IngestionPipeline {
    /// Create a new ingestion pipeline
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedder: BatchEmbedder,
        store: Arc<TextStore>,
    ) -> Self {
        Self {
            source,
            parser: DocumentParser::new(),
            embedder,
            store,
            locks: DashMap::new(),
        }
    }

    /// Ingest one legal code.
    ///
    /// Serialized per code: a second call for the same code waits for the
    /// first to finish. Different codes are independent.
    pub async fn ingest(&self, code: &str) -> Result<IngestReport> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(StoreError::validation("code", "must not be empty"));
        }

        let lock = self
            .locks
            .entry(code.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        self.run(&code).await
    }

    /// Ingest several codes concurrently; each code succeeds or fails on its
    /// own (per-code isolation).
    pub async fn ingest_many(&self, codes: &[String]) -> Vec<(String, Result<IngestReport>)> {
        let futures = codes.iter().map(|code| async move {
            let result = self.ingest(code).await;
            (code.clone(), result)
        });
        join_all(futures).await
    }

    /// One ingestion run, the per-code lock already held.
    async fn run(&self, code: &str) -> Result<IngestReport> {
        tracing::info!(code, source = self.source.name(), "starting ingestion");

        let raw = self.source.fetch_document(code).await.map_err(|e| {
            tracing::error!(code, error = %e, "document fetch failed");
            e
        })?;

        let outcome = self.parser.parse(&raw.content, code)?;
        for warning in &outcome.warnings {
            tracing::warn!(code, warning = %warning, "parse warning");
        }

        let mut report = IngestReport {
            code: code.to_string(),
            warnings: outcome.warnings.iter().map(|w| w.to_string()).collect(),
            ..IngestReport::default()
        };

        // Diff parsed units against the store; only new or changed content
        // goes through the embedding service.
        let model_version = self.embedder.provider().model_version().to_string();
        let now = Utc::now();
        let mut pending: Vec<PendingUnit> = Vec::new();

        for parsed in outcome.units {
            let hash = content_hash(&parsed.text);
            let existing = self
                .store
                .get(code, &parsed.section, parsed.sub_section.as_deref())?;

            match existing {
                Some(existing)
                    if existing.content_hash == hash
                        && existing.model_version == model_version
                        && existing.embedding.is_some() =>
                {
                    report.unchanged += 1;
                    if existing.position != parsed.position {
                        // Document got reordered upstream; keep the stored
                        // text and vector, refresh only the order index.
                        let mut refreshed = existing;
                        refreshed.position = parsed.position;
                        if let Err(e) = self.store.put(&refreshed) {
                            tracing::warn!(code, error = %e, "failed to refresh unit position");
                        }
                    }
                }
                Some(existing) => {
                    pending.push(PendingUnit {
                        unit: TextUnit {
                            id: existing.id,
                            code: code.to_string(),
                            section: parsed.section,
                            sub_section: parsed.sub_section,
                            text: parsed.text,
                            content_hash: hash,
                            embedding: None,
                            model_version: model_version.clone(),
                            position: parsed.position,
                            ingested_at: existing.ingested_at,
                            updated_at: now,
                        },
                        is_new: false,
                    });
                }
                None => {
                    pending.push(PendingUnit {
                        unit: TextUnit {
                            id: Uuid::new_v4(),
                            code: code.to_string(),
                            section: parsed.section,
                            sub_section: parsed.sub_section,
                            text: parsed.text,
                            content_hash: hash,
                            embedding: None,
                            model_version: model_version.clone(),
                            position: parsed.position,
                            ingested_at: now,
                            updated_at: now,
                        },
                        is_new: true,
                    });
                }
            }
        }

        if pending.is_empty() {
            tracing::info!(code, unchanged = report.unchanged, "nothing to embed");
            return Ok(report);
        }

        tracing::info!(
            code,
            to_embed = pending.len(),
            unchanged = report.unchanged,
            "embedding new and changed units"
        );

        let texts: Vec<String> = pending.iter().map(|p| p.unit.text.clone()).collect();
        let embeddings = self.embedder.embed_all(&texts).await;

        for (p, embedding) in pending.into_iter().zip(embeddings) {
            let key = p.unit.key();
            match embedding {
                Ok(vector) => {
                    let mut unit = p.unit;
                    unit.embedding = Some(vector);
                    match self.store.put(&unit) {
                        Ok(()) => {
                            if p.is_new {
                                report.created += 1;
                            } else {
                                report.updated += 1;
                            }
                        }
                        Err(e) => {
                            tracing::error!(code, key = %key, error = %e, "unit write failed");
                            report.failed += 1;
                            report.failures.push(format!("{}: {}", key, e));
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(code, key = %key, error = %e, "unit embedding failed");
                    report.failed += 1;
                    report.failures.push(format!("{}: {}", key, e));
                }
            }
        }

        self.store.flush()?;

        tracing::info!(
            code,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "ingestion completed"
        );

        Ok(report)
    }
}
