//! # gesetze-im-internet.de Data Source
//!
//! ## Purpose
//! Downloads statute documents from the German federal law archive. Each code
//! is published as an `xml.zip` archive whose first entry is the statute XML.
//!
//! ## Input/Output Specification
//! - **Input**: Legal code slug (e.g. "bgb"), archive base URL
//! - **Output**: Raw statute XML bytes
//! - **Errors**: `NotFound` for unknown codes, `Network` for transport faults
//!
//! ## Key Features
//! - Bounded request timeout and pinned user agent
//! - In-memory zip extraction (first archive entry, like the publisher docs)

use super::{DocumentSource, RawDocument, SourceHealth};
use crate::config::SourceConfig;
use crate::errors::{Result, StoreError};
use crate::text_processing::normalize_code;
use async_trait::async_trait;
use chrono::Utc;
use std::io::{Cursor, Read};
use std::time::{Duration, Instant};

/// Document source backed by the gesetze-im-internet.de archive
pub struct GesetzeImInternetSource {
    config: SourceConfig,
    client: reqwest::Client,
}

impl GesetzeImInternetSource {
    /// Create a new source from configuration
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| StoreError::Network {
                reason: e.to_string(),
            })?;

        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    /// Archive URL for a code, e.g. `https://www.gesetze-im-internet.de/bgb/xml.zip`
    fn archive_url(&self, code: &str) -> String {
        format!(
            "{}/{}/xml.zip",
            self.config.base_url.trim_end_matches('/'),
            code
        )
    }

    /// Extract the first entry of the downloaded archive.
    fn extract_xml_from_zip(code: &str, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| StoreError::Parse {
                code: code.to_string(),
                reason: format!("invalid zip archive: {}", e),
            })?;

        if archive.len() == 0 {
            return Err(StoreError::Parse {
                code: code.to_string(),
                reason: "archive contains no files".to_string(),
            });
        }

        let mut file = archive.by_index(0).map_err(|e| StoreError::Parse {
            code: code.to_string(),
            reason: format!("failed to read archive entry: {}", e),
        })?;

        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)
            .map_err(|e| StoreError::Parse {
                code: code.to_string(),
                reason: format!("failed to decompress archive entry: {}", e),
            })?;
        Ok(content)
    }
}

#[async_trait]
impl DocumentSource for GesetzeImInternetSource {
    fn name(&self) -> &str {
        "gesetze-im-internet"
    }

    async fn fetch_document(&self, code: &str) -> Result<RawDocument> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(StoreError::validation("code", "must not be empty"));
        }

        let url = self.archive_url(&code);
        tracing::debug!(code = %code, url = %url, "fetching statute archive");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Network {
                reason: format!("failed to fetch {}: {}", url, e),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                what: format!("code '{}' at {}", code, self.name()),
            });
        }
        if !response.status().is_success() {
            return Err(StoreError::Network {
                reason: format!("HTTP {} fetching {}", response.status(), url),
            });
        }

        let bytes = response.bytes().await.map_err(|e| StoreError::Network {
            reason: format!("failed to read archive body: {}", e),
        })?;

        let content = Self::extract_xml_from_zip(&code, &bytes)?;
        tracing::debug!(code = %code, bytes = content.len(), "extracted statute XML");

        Ok(RawDocument {
            code,
            content,
            source_url: url,
            fetched_at: Utc::now(),
        })
    }

    async fn health_check(&self) -> Result<SourceHealth> {
        let start = Instant::now();
        let response = self.client.get(&self.config.base_url).send().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(SourceHealth {
                is_healthy: true,
                last_check: Utc::now(),
                response_time_ms,
                error_message: None,
            }),
            Ok(resp) => Ok(SourceHealth {
                is_healthy: false,
                last_check: Utc::now(),
                response_time_ms,
                error_message: Some(format!("HTTP {}", resp.status())),
            }),
            Err(e) => Ok(SourceHealth {
                is_healthy: false,
                last_check: Utc::now(),
                response_time_ms,
                error_message: Some(e.to_string()),
            }),
        }
    }
}
