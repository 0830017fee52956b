//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration management for the legal text store, supporting
//! TOML files and environment variable overrides with validation and
//! type-safe access to all system settings.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files (TOML), environment variables
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Type checking, range validation
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables (highest priority)
//! 2. Configuration files
//! 3. Default values (lowest priority)
//!
//! ## Usage
//! ```rust
//! use legal_text_store::config::Config;
//!
//! // Load from default locations
//! let config = Config::load().unwrap();
//! println!("Server port: {}", config.server.port);
//! ```

use crate::errors::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server and API configuration
    pub server: ServerConfig,
    /// Upstream document source settings
    pub source: SourceConfig,
    /// Embedding service configuration
    pub embedding: EmbeddingConfig,
    /// Storage and database settings
    pub storage: StorageConfig,
    /// Retrieval behavior
    pub search: SearchConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Known legal codes (read-only reference data)
    pub catalog: Vec<CatalogEntryConfig>,
}

/// Server and API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Number of HTTP worker threads
    pub workers: usize,
}

/// Upstream document source configuration (gesetze-im-internet.de)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the statute archive
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent sent with download requests
    pub user_agent: String,
}

/// Embedding service configuration (Ollama-compatible HTTP API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL for the embedding service
    pub base_url: String,
    /// Authentication token (empty = no authentication)
    pub auth_token: String,
    /// Embedding model identifier; pins vector dimensionality
    pub model: String,
    /// Vector dimension (must match model output)
    pub dimension: usize,
    /// Request timeout in seconds for embedding calls
    pub timeout_seconds: u64,
    /// Number of texts to embed per request
    pub batch_size: usize,
    /// Retry ceiling for failed batches
    pub max_retries: u32,
    /// Delay between retries in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum concurrently in-flight embedding batches
    pub max_concurrent_batches: usize,
}

/// Storage and database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path
    pub db_path: PathBuf,
    /// Enable payload compression
    pub enable_compression: bool,
}

/// Retrieval behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default maximum number of search results
    pub default_limit: usize,
    /// Hard cap on the number of search results
    pub max_limit: usize,
    /// Default cosine distance cutoff for semantic search
    pub default_cutoff: f32,
    /// Maximum query length in characters
    pub max_query_length: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable structured JSON logging
    pub json_format: bool,
}

/// One catalog entry: reference data about a known legal code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntryConfig {
    /// Code identifier (URL slug)
    pub code: String,
    /// Human-readable statute title
    pub title: String,
    /// Source locator; defaults to the standard archive URL for the code
    #[serde(default)]
    pub source_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            enable_cors: true,
            workers: num_cpus::get(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.gesetze-im-internet.de".to_string(),
            timeout_seconds: 60,
            user_agent: format!("legal-text-store/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            auth_token: String::new(),
            model: "nomic-embed-text".to_string(),
            dimension: 768,
            timeout_seconds: 300,
            batch_size: 50,
            max_retries: 3,
            retry_delay_ms: 500,
            max_concurrent_batches: 4,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/legal_texts.db"),
            enable_compression: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            default_cutoff: 0.7,
            max_query_length: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| StoreError::Config {
                message: format!("Failed to read config file {:?}: {}", path, e),
            })?;
            toml::from_str(&content).map_err(|e| StoreError::Config {
                message: format!("Failed to parse config file {:?}: {}", path, e),
            })?
        } else {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("LEGAL_STORE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("LEGAL_STORE_PORT") {
            self.server.port = port.parse().map_err(|_| StoreError::Config {
                message: "Invalid port number in LEGAL_STORE_PORT".to_string(),
            })?;
        }
        if let Ok(db_path) = std::env::var("LEGAL_STORE_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }
        if let Ok(base_url) = std::env::var("OLLAMA_BASE_URL") {
            self.embedding.base_url = base_url;
        }
        if let Ok(token) = std::env::var("OLLAMA_AUTH_TOKEN") {
            self.embedding.auth_token = token;
        }
        if let Ok(model) = std::env::var("OLLAMA_EMBED_MODEL") {
            self.embedding.model = model;
        }

        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.embedding.model.is_empty() {
            return Err(StoreError::validation(
                "embedding.model",
                "Embedding model must not be empty",
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(StoreError::validation(
                "embedding.dimension",
                "Vector dimension must be greater than zero",
            ));
        }
        if self.embedding.batch_size == 0 || self.embedding.batch_size > 500 {
            return Err(StoreError::validation(
                "embedding.batch_size",
                "Batch size must be between 1 and 500",
            ));
        }
        if self.embedding.timeout_seconds == 0 || self.embedding.timeout_seconds > 3600 {
            return Err(StoreError::validation(
                "embedding.timeout_seconds",
                "Timeout must be between 1 and 3600 seconds",
            ));
        }
        if self.search.max_limit == 0 {
            return Err(StoreError::validation(
                "search.max_limit",
                "Result limit cap must be greater than zero",
            ));
        }
        if !(0.0..=2.0).contains(&self.search.default_cutoff) {
            return Err(StoreError::validation(
                "search.default_cutoff",
                "Cosine distance cutoff must be within [0, 2]",
            ));
        }

        Ok(())
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config {
            message: format!("Failed to serialize config to TOML: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_cutoff() {
        let mut config = Config::default();
        config.search.default_cutoff = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_batch() {
        let mut config = Config::default();
        config.embedding.batch_size = 501;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            model = "mxbai-embed-large"
            dimension = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.model, "mxbai-embed-large");
        assert_eq!(config.embedding.dimension, 1024);
        assert_eq!(config.server.port, 8000);
    }
}
