//! # Storage Management Module
//!
//! ## Purpose
//! Durable storage of text units and their embeddings using an embedded
//! database, exposing exact structural queries and nearest-neighbor search
//! with a distance cutoff.
//!
//! ## Input/Output Specification
//! - **Input**: Text units keyed by (code, section, sub-section)
//! - **Output**: Exact filter results, distance-ranked nearest neighbors
//! - **Storage**: Sled embedded database, bincode-encoded records
//!
//! ## Key Features
//! - Atomic per-unit upserts: text, hash and embedding commit together
//! - Deterministic ordering (document position, then distance tie-breaks)
//! - Model-version pinning: vectors of different models never mix in one query
//! - Optional payload compression for space efficiency

use crate::config::StorageConfig;
use crate::errors::{Result, StoreError};
use crate::text_processing::normalize_code;
use crate::TextUnit;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Field separator inside encoded keys; headings never contain it
const KEY_SEP: u8 = 0x1f;

/// Payload framing: first byte marks the encoding of the rest
const FRAME_RAW: u8 = 0;
const FRAME_GZIP: u8 = 1;

/// Meta tree keys for the persisted model pin
const META_MODEL_VERSION: &[u8] = b"model_version";
const META_DIMENSION: &[u8] = b"dimension";

/// Main text unit store
pub struct TextStore {
    db: sled::Db,
    units: sled::Tree,
    meta: sled::Tree,
    enable_compression: bool,
    model_version: String,
    dimension: usize,
    stats: RwLock<StoreStats>,
}

/// Storage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_units: usize,
    pub database_size_bytes: u64,
}

impl TextStore {
    /// Open (or create) the store, pinning the embedding model version and
    /// vector dimensionality all semantic queries are scoped to.
    pub fn open(config: &StorageConfig, model_version: &str, dimension: usize) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = sled::open(&config.db_path).map_err(|e| StoreError::Storage {
            reason: format!(
                "failed to open database at {:?}: {}",
                config.db_path, e
            ),
        })?;
        let units = db.open_tree("text_units")?;
        let meta = db.open_tree("meta")?;

        // Detect a model switch left over from a previous run; affected units
        // are filtered out of semantic queries until re-embedded.
        if let Some(previous) = meta.get(META_MODEL_VERSION)? {
            let previous = String::from_utf8_lossy(&previous).to_string();
            if previous != model_version {
                tracing::warn!(
                    previous_model = %previous,
                    current_model = %model_version,
                    "embedding model changed; existing units need re-embedding"
                );
            }
        }
        meta.insert(META_MODEL_VERSION, model_version.as_bytes())?;
        meta.insert(META_DIMENSION, dimension.to_string().as_bytes())?;

        let total_units = units.len();
        let database_size_bytes = db.size_on_disk().unwrap_or(0);

        let store = Self {
            db,
            units,
            meta,
            enable_compression: config.enable_compression,
            model_version: model_version.to_string(),
            dimension,
            stats: RwLock::new(StoreStats {
                total_units,
                database_size_bytes,
            }),
        };

        tracing::info!(
            units = total_units,
            model = %model_version,
            dimension,
            "text store opened"
        );

        Ok(store)
    }

    /// Upsert a unit by its (code, section, sub-section) key.
    ///
    /// The whole record is written in one insert, so readers either see the
    /// previous state or the full new unit, never text without its embedding.
    pub fn put(&self, unit: &TextUnit) -> Result<()> {
        self.validate_unit(unit)?;

        let key = encode_key(&unit.code, &unit.section, unit.sub_section.as_deref());
        let payload = self.encode_unit(unit)?;
        let previous = self.units.insert(key, payload)?;

        if previous.is_none() {
            self.stats.write().total_units += 1;
        }

        tracing::debug!(key = %unit.key(), "stored text unit");
        Ok(())
    }

    /// Fetch a single unit by exact key.
    pub fn get(
        &self,
        code: &str,
        section: &str,
        sub_section: Option<&str>,
    ) -> Result<Option<TextUnit>> {
        let key = encode_key(code, section, sub_section);
        match self.units.get(key)? {
            Some(payload) => Ok(Some(self.decode_unit(&payload)?)),
            None => Ok(None),
        }
    }

    /// Exact structural query.
    ///
    /// An omitted `section` returns every unit of the code; an omitted
    /// `sub_section` returns every unit under the section. Results are in
    /// document order. An unknown code yields an empty result, not an error.
    pub fn get_by_key(
        &self,
        code: &str,
        section: Option<&str>,
        sub_section: Option<&str>,
    ) -> Result<Vec<TextUnit>> {
        let mut results = Vec::new();
        for entry in self.units.scan_prefix(code_prefix(code)) {
            let (_, payload) = entry?;
            let unit = self.decode_unit(&payload)?;
            if let Some(section) = section {
                if unit.section != section {
                    continue;
                }
                if let Some(sub) = sub_section {
                    if unit.sub_section.as_deref() != Some(sub) {
                        continue;
                    }
                }
            }
            results.push(unit);
        }

        results.sort_by_key(|u| u.position);
        Ok(results)
    }

    /// Nearest-neighbor query over the embedded units of one code.
    ///
    /// Computes cosine distance (range [0, 2]) between `query` and every
    /// candidate carrying an embedding of the pinned model version, keeps
    /// those within `max_distance`, and returns the `limit` closest in
    /// ascending distance. Ties break on document position so results are
    /// deterministic.
    pub fn nearest(
        &self,
        code: &str,
        query: &[f32],
        limit: usize,
        max_distance: f32,
    ) -> Result<Vec<(TextUnit, f32)>> {
        if limit == 0 {
            return Err(StoreError::validation("limit", "must be greater than zero"));
        }
        if !max_distance.is_finite() || max_distance < 0.0 {
            return Err(StoreError::validation(
                "max_distance",
                "must be a non-negative number",
            ));
        }
        if query.len() != self.dimension {
            return Err(StoreError::validation(
                "query_vector",
                format!(
                    "dimension mismatch: expected {}, got {}",
                    self.dimension,
                    query.len()
                ),
            ));
        }

        let mut candidates = Vec::new();
        for entry in self.units.scan_prefix(code_prefix(code)) {
            let (_, payload) = entry?;
            let unit = self.decode_unit(&payload)?;
            if unit.embedding.is_some() && unit.model_version == self.model_version {
                candidates.push(unit);
            }
        }

        let mut scored: Vec<(TextUnit, f32)> = candidates
            .into_par_iter()
            .filter_map(|unit| {
                let embedding = unit.embedding.as_deref()?;
                let distance = cosine_distance(query, embedding)?;
                if distance <= max_distance {
                    Some((unit, distance))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|(a, da), (b, db)| {
            da.total_cmp(db).then_with(|| a.position.cmp(&b.position))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// All codes with at least one stored unit.
    pub fn list_codes(&self) -> Result<BTreeSet<String>> {
        let mut codes = BTreeSet::new();
        for entry in self.units.iter() {
            let (key, _) = entry?;
            if let Some(sep) = key.iter().position(|&b| b == KEY_SEP) {
                codes.insert(String::from_utf8_lossy(&key[..sep]).to_string());
            }
        }
        Ok(codes)
    }

    /// Number of units stored for a code.
    pub fn count_by_code(&self, code: &str) -> Result<usize> {
        Ok(self.units.scan_prefix(code_prefix(code)).count())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(StoreError::from)?;
        Ok(())
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> StoreStats {
        let mut stats = self.stats.write();
        stats.database_size_bytes = self.db.size_on_disk().unwrap_or(0);
        stats.clone()
    }

    /// The model version semantic queries are pinned to
    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// The vector dimensionality of the pinned model
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Health check: exercise a write/read/delete cycle on the meta tree
    pub fn health_check(&self) -> Result<()> {
        let key = b"__health_check__";
        self.meta.insert(key, b"ok")?;
        let read = self.meta.get(key)?;
        if read.as_deref() != Some(b"ok".as_ref()) {
            return Err(StoreError::Storage {
                reason: "health check value mismatch".to_string(),
            });
        }
        self.meta.remove(key)?;
        Ok(())
    }

    /// Reject units violating key or content constraints.
    fn validate_unit(&self, unit: &TextUnit) -> Result<()> {
        if unit.code.is_empty() {
            return Err(StoreError::validation("code", "must not be empty"));
        }
        if unit.code != normalize_code(&unit.code) {
            return Err(StoreError::validation(
                "code",
                "must be lowercase-normalized",
            ));
        }
        if unit.section.trim().is_empty() {
            return Err(StoreError::validation("section", "must not be empty"));
        }
        if unit.sub_section.as_deref() == Some("") {
            return Err(StoreError::validation(
                "sub_section",
                "must be absent rather than empty",
            ));
        }
        if unit.text.trim().is_empty() {
            return Err(StoreError::validation("text", "must not be empty"));
        }
        for (field, value) in [("code", &unit.code), ("section", &unit.section)] {
            if value.bytes().any(|b| b == KEY_SEP) {
                return Err(StoreError::validation(field, "contains reserved separator"));
            }
        }
        if let Some(sub) = &unit.sub_section {
            if sub.bytes().any(|b| b == KEY_SEP) {
                return Err(StoreError::validation(
                    "sub_section",
                    "contains reserved separator",
                ));
            }
        }
        if let Some(embedding) = &unit.embedding {
            if embedding.len() != self.dimension {
                return Err(StoreError::validation(
                    "embedding",
                    format!(
                        "dimension mismatch: expected {}, got {}",
                        self.dimension,
                        embedding.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn encode_unit(&self, unit: &TextUnit) -> Result<Vec<u8>> {
        let encoded = bincode::serialize(unit)?;
        if self.enable_compression {
            let mut payload = vec![FRAME_GZIP];
            let mut encoder =
                flate2::write::GzEncoder::new(&mut payload, flate2::Compression::default());
            std::io::Write::write_all(&mut encoder, &encoded)
                .map_err(|e| StoreError::storage(format!("compression failed: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| StoreError::storage(format!("compression failed: {}", e)))?;
            Ok(payload)
        } else {
            let mut payload = vec![FRAME_RAW];
            payload.extend_from_slice(&encoded);
            Ok(payload)
        }
    }

    fn decode_unit(&self, payload: &[u8]) -> Result<TextUnit> {
        let (frame, body) = payload.split_first().ok_or_else(|| StoreError::Storage {
            reason: "empty payload".to_string(),
        })?;
        match *frame {
            FRAME_RAW => Ok(bincode::deserialize(body)?),
            FRAME_GZIP => {
                let mut decoder = flate2::read::GzDecoder::new(body);
                let mut decoded = Vec::new();
                std::io::Read::read_to_end(&mut decoder, &mut decoded)
                    .map_err(|e| StoreError::storage(format!("decompression failed: {}", e)))?;
                Ok(bincode::deserialize(&decoded)?)
            }
            other => Err(StoreError::Storage {
                reason: format!("unknown payload frame {}", other),
            }),
        }
    }
}

/// Encode the addressable key for sled. `None` sub-sections encode as the
/// empty segment, which cannot collide because stored sub-sections are never
/// empty strings.
fn encode_key(code: &str, section: &str, sub_section: Option<&str>) -> Vec<u8> {
    let mut key = Vec::with_capacity(code.len() + section.len() + 8);
    key.extend_from_slice(code.as_bytes());
    key.push(KEY_SEP);
    key.extend_from_slice(section.as_bytes());
    key.push(KEY_SEP);
    if let Some(sub) = sub_section {
        key.extend_from_slice(sub.as_bytes());
    }
    key
}

fn code_prefix(code: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(code.len() + 1);
    prefix.extend_from_slice(code.as_bytes());
    prefix.push(KEY_SEP);
    prefix
}

/// Cosine distance in [0, 2]; `None` when either vector has zero norm and
/// similarity is undefined.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    Some((1.0 - similarity).clamp(0.0, 2.0))
}
