//! # Code Catalog Module
//!
//! ## Purpose
//! Read-only reference data about known legal codes: identifier, title and
//! source locator. Sourced from configuration (with built-in defaults for the
//! common federal codes) and never modified by ingestion.
//!
//! ## Input/Output Specification
//! - **Input**: Configured catalog entries, source base URL
//! - **Output**: Lookup by code, enumeration for bulk ingestion

use crate::config::CatalogEntryConfig;
use crate::text_processing::normalize_code;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One catalog entry describing a known legal code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Code identifier (URL slug)
    pub code: String,
    /// Human-readable statute title
    pub title: String,
    /// Where the statute document is published
    pub source_url: String,
}

/// Immutable catalog of known legal codes
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

/// Federal codes shipped as defaults when no catalog is configured
const DEFAULT_ENTRIES: &[(&str, &str)] = &[
    ("bgb", "Bürgerliches Gesetzbuch"),
    ("stgb", "Strafgesetzbuch"),
    ("hgb", "Handelsgesetzbuch"),
    ("gg", "Grundgesetz für die Bundesrepublik Deutschland"),
    ("zpo", "Zivilprozessordnung"),
    ("stpo", "Strafprozeßordnung"),
    ("vwvfg", "Verwaltungsverfahrensgesetz"),
    ("urhg", "Urheberrechtsgesetz"),
];

impl Catalog {
    /// Build the catalog from configuration; falls back to the built-in
    /// federal codes when the configured list is empty.
    pub fn from_config(configured: &[CatalogEntryConfig], source_base_url: &str) -> Self {
        let base = source_base_url.trim_end_matches('/');
        let mut entries = BTreeMap::new();

        if configured.is_empty() {
            for (code, title) in DEFAULT_ENTRIES {
                entries.insert(
                    (*code).to_string(),
                    CatalogEntry {
                        code: (*code).to_string(),
                        title: (*title).to_string(),
                        source_url: format!("{}/{}/xml.zip", base, code),
                    },
                );
            }
        } else {
            for entry in configured {
                let code = normalize_code(&entry.code);
                if code.is_empty() {
                    continue;
                }
                let source_url = entry
                    .source_url
                    .clone()
                    .unwrap_or_else(|| format!("{}/{}/xml.zip", base, code));
                entries.insert(
                    code.clone(),
                    CatalogEntry {
                        code,
                        title: entry.title.clone(),
                        source_url,
                    },
                );
            }
        }

        Self { entries }
    }

    /// Look up a code
    pub fn get(&self, code: &str) -> Option<&CatalogEntry> {
        self.entries.get(&normalize_code(code))
    }

    /// All known codes, sorted
    pub fn codes(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// All entries, sorted by code
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let catalog = Catalog::from_config(&[], "https://www.gesetze-im-internet.de");
        assert!(!catalog.is_empty());
        let bgb = catalog.get("bgb").unwrap();
        assert_eq!(bgb.title, "Bürgerliches Gesetzbuch");
        assert_eq!(
            bgb.source_url,
            "https://www.gesetze-im-internet.de/bgb/xml.zip"
        );
    }

    #[test]
    fn configured_entries_replace_defaults() {
        let configured = vec![CatalogEntryConfig {
            code: "EStG".to_string(),
            title: "Einkommensteuergesetz".to_string(),
            source_url: None,
        }];
        let catalog = Catalog::from_config(&configured, "https://example.org/");

        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("bgb").is_none());
        let entry = catalog.get("estg").unwrap();
        assert_eq!(entry.code, "estg");
        assert_eq!(entry.source_url, "https://example.org/estg/xml.zip");
    }

    #[test]
    fn explicit_source_url_wins() {
        let configured = vec![CatalogEntryConfig {
            code: "bgb".to_string(),
            title: "Bürgerliches Gesetzbuch".to_string(),
            source_url: Some("https://mirror.example/bgb.zip".to_string()),
        }];
        let catalog = Catalog::from_config(&configured, "https://www.gesetze-im-internet.de");
        assert_eq!(
            catalog.get("bgb").unwrap().source_url,
            "https://mirror.example/bgb.zip"
        );
    }
}
