//! # Retrieval Service Module
//!
//! ## Purpose
//! Composes store and embedding queries into the two public retrieval
//! operations: exact structural lookup and semantic similarity search.
//!
//! ## Input/Output Specification
//! - **Input**: Code/section/sub-section filters, free-text queries
//! - **Output**: Text units in document order, or similarity-ranked hits
//! - **Scores**: `similarity_score = 1 - cosine_distance`, higher is better
//!
//! ## Cutoff Semantics
//! The `cutoff` parameter is a maximum cosine **distance** in [0, 2]; values
//! outside that range are clamped. Results always satisfy
//! `distance <= cutoff`, i.e. `similarity_score >= 1 - cutoff`.

use crate::config::SearchConfig;
use crate::embedding::EmbeddingProvider;
use crate::errors::{Result, StoreError};
use crate::storage::TextStore;
use crate::text_processing::normalize_code;
use crate::TextUnit;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameters for a semantic search request
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Maximum number of results; clamped to the configured cap
    pub limit: usize,
    /// Maximum cosine distance for a result to qualify; clamped to [0, 2]
    pub cutoff: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            cutoff: 0.7,
        }
    }
}

/// One semantic search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matched unit
    pub unit: TextUnit,
    /// Cosine distance to the query, in [0, 2]
    pub distance: f32,
    /// `1 - distance`: bounded, higher-is-better score surfaced to callers
    pub similarity_score: f32,
}

/// Read-only retrieval service over the text store
pub struct RetrievalService {
    store: Arc<TextStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

impl RetrievalService {
    /// Create a retrieval service with default search limits
    pub fn new(store: Arc<TextStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_config(store, embedder, SearchConfig::default())
    }

    /// Create a retrieval service with explicit search limits
    pub fn with_config(
        store: Arc<TextStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Exact structural lookup.
    ///
    /// Fails with `NotFound` when the code has no stored units at all. A
    /// known code with a non-matching section filter yields an empty result.
    /// A `sub_section` filter requires a `section` filter.
    pub async fn query(
        &self,
        code: &str,
        section: Option<&str>,
        sub_section: Option<&str>,
    ) -> Result<Vec<TextUnit>> {
        if sub_section.is_some() && section.is_none() {
            return Err(StoreError::validation(
                "sub_section",
                "sub_section filter can only be used when section filter is also provided",
            ));
        }

        let code = normalize_code(code);
        let results = self.store.get_by_key(&code, section, sub_section)?;

        if results.is_empty() && self.store.count_by_code(&code)? == 0 {
            return Err(StoreError::NotFound {
                what: format!("no legal texts for code '{}'", code),
            });
        }

        Ok(results)
    }

    /// Semantic similarity search.
    ///
    /// Embeds the query text and ranks the code's units by ascending cosine
    /// distance. A code without embedded units yields an empty result set,
    /// not an error; callers can distinguish "unknown code" via
    /// [`RetrievalService::list_codes`].
    pub async fn search(
        &self,
        code: &str,
        query_text: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let query_text = query_text.trim();
        if query_text.is_empty() {
            return Err(StoreError::validation("q", "query text must not be empty"));
        }
        if query_text.len() > self.config.max_query_length {
            return Err(StoreError::validation(
                "q",
                format!(
                    "query too long: maximum {} characters",
                    self.config.max_query_length
                ),
            ));
        }

        let limit = options.limit.clamp(1, self.config.max_limit);
        let cutoff = if options.cutoff.is_finite() {
            options.cutoff.clamp(0.0, 2.0)
        } else {
            self.config.default_cutoff
        };

        let code = normalize_code(code);
        if self.store.count_by_code(&code)? == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embed_query(query_text).await?;
        let ranked = self.store.nearest(&code, &query_vector, limit, cutoff)?;

        Ok(ranked
            .into_iter()
            .map(|(unit, distance)| SearchHit {
                unit,
                distance,
                similarity_score: 1.0 - distance,
            })
            .collect())
    }

    /// All codes with at least one stored unit, sorted.
    pub fn list_codes(&self) -> Result<Vec<String>> {
        Ok(self.store.list_codes()?.into_iter().collect())
    }

    /// Embed a single query string through the provider.
    async fn embed_query(&self, query_text: &str) -> Result<Vec<f32>> {
        let input = [query_text.to_string()];
        let mut results = self.embedder.embed_batch(&input).await?;
        match results.pop() {
            Some(Ok(vector)) => Ok(vector),
            Some(Err(e)) => Err(e),
            None => Err(StoreError::EmbeddingService {
                status: None,
                reason: "provider returned no result for query".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::embedding::EmbedResult;
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    /// Provider pinning every query to a fixed direction
    struct FixedQueryProvider;

    #[async_trait]
    impl EmbeddingProvider for FixedQueryProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbedResult>> {
            Ok(texts.iter().map(|_| Ok(vec![1.0, 0.0, 0.0])).collect())
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_version(&self) -> &str {
            "test-model"
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn service_with_store(dir: &tempfile::TempDir) -> (RetrievalService, Arc<TextStore>) {
        let config = StorageConfig {
            db_path: dir.path().join("store.db"),
            enable_compression: true,
        };
        let store = Arc::new(TextStore::open(&config, "test-model", 3).unwrap());
        let service = RetrievalService::new(store.clone(), Arc::new(FixedQueryProvider));
        (service, store)
    }

    fn unit(section: &str, sub: Option<&str>, position: u32, embedding: Vec<f32>) -> TextUnit {
        let text = format!("Body of {} {}", section, sub.unwrap_or("-"));
        TextUnit {
            id: Uuid::new_v4(),
            code: "bgb".to_string(),
            section: section.to_string(),
            sub_section: sub.map(|s| s.to_string()),
            content_hash: crate::text_processing::content_hash(&text),
            text,
            embedding: Some(embedding),
            model_version: "test-model".to_string(),
            position,
            ingested_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn query_unknown_code_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with_store(&dir);

        let err = service.query("nonexistent", None, None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn query_known_code_with_unmatched_section_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (service, store) = service_with_store(&dir);
        store
            .put(&unit("§ 1", None, 0, vec![1.0, 0.0, 0.0]))
            .unwrap();

        let results = service.query("bgb", Some("§ 99"), None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn query_rejects_sub_section_without_section() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with_store(&dir);

        let err = service.query("bgb", None, Some("1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn query_normalizes_code_case() {
        let dir = tempfile::tempdir().unwrap();
        let (service, store) = service_with_store(&dir);
        store
            .put(&unit("§ 1", None, 0, vec![1.0, 0.0, 0.0]))
            .unwrap();

        let results = service.query("BGB", None, None).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn search_unknown_code_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with_store(&dir);

        let hits = service
            .search("nonexistent", "anything", SearchOptions::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_descending() {
        let dir = tempfile::tempdir().unwrap();
        let (service, store) = service_with_store(&dir);

        store
            .put(&unit("§ 1", None, 0, vec![1.0, 0.0, 0.0]))
            .unwrap();
        store
            .put(&unit("§ 2", None, 1, vec![0.7, 0.7, 0.0]))
            .unwrap();
        store
            .put(&unit("§ 3", None, 2, vec![0.0, 1.0, 0.0]))
            .unwrap();

        let hits = service
            .search(
                "bgb",
                "query",
                SearchOptions {
                    limit: 10,
                    cutoff: 2.0,
                },
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].unit.section, "§ 1");
        for window in hits.windows(2) {
            assert!(window[0].similarity_score >= window[1].similarity_score);
        }
        assert!((hits[0].similarity_score - 1.0).abs() < 1e-5);
        for hit in &hits {
            assert!((hit.similarity_score - (1.0 - hit.distance)).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn search_applies_cutoff_and_limit_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let (service, store) = service_with_store(&dir);

        store
            .put(&unit("§ 1", None, 0, vec![1.0, 0.0, 0.0]))
            .unwrap();
        store
            .put(&unit("§ 2", None, 1, vec![-1.0, 0.0, 0.0]))
            .unwrap();

        // Cutoff excludes the opposite-direction unit
        let hits = service
            .search(
                "bgb",
                "query",
                SearchOptions {
                    limit: 10,
                    cutoff: 0.5,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        // Out-of-range cutoff is clamped into [0, 2] rather than rejected
        let hits = service
            .search(
                "bgb",
                "query",
                SearchOptions {
                    limit: 0,
                    cutoff: 5.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn search_rejects_blank_query() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with_store(&dir);

        let err = service
            .search("bgb", "   ", SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn cutoff_monotonicity_smaller_cutoff_yields_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let (service, store) = service_with_store(&dir);

        store
            .put(&unit("§ 1", None, 0, vec![1.0, 0.0, 0.0]))
            .unwrap();
        store
            .put(&unit("§ 2", None, 1, vec![0.7, 0.7, 0.0]))
            .unwrap();
        store
            .put(&unit("§ 3", None, 2, vec![0.0, 1.0, 0.0]))
            .unwrap();

        let strict = service
            .search(
                "bgb",
                "query",
                SearchOptions {
                    limit: 10,
                    cutoff: 0.5,
                },
            )
            .await
            .unwrap();
        let loose = service
            .search(
                "bgb",
                "query",
                SearchOptions {
                    limit: 10,
                    cutoff: 1.5,
                },
            )
            .await
            .unwrap();

        assert!(strict.len() <= loose.len());
        for (s, l) in strict.iter().zip(loose.iter()) {
            assert_eq!(s.unit.id, l.unit.id);
        }
    }

    #[tokio::test]
    async fn list_codes_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let (service, store) = service_with_store(&dir);

        let mut stgb = unit("§ 1", None, 0, vec![1.0, 0.0, 0.0]);
        stgb.code = "stgb".to_string();
        store.put(&stgb).unwrap();
        store
            .put(&unit("§ 1", None, 0, vec![1.0, 0.0, 0.0]))
            .unwrap();

        assert_eq!(service.list_codes().unwrap(), vec!["bgb", "stgb"]);
    }
}
