//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the legal text store, providing the error
//! taxonomy shared by ingestion, storage and retrieval components.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from parsing, embedding, storage, retrieval
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Parse, Embedding, Storage, Validation, Network, Config
//!
//! ## Key Features
//! - Single error enum with per-category variants
//! - Automatic conversion from common library errors
//! - Recoverability classification for retry decisions
//! - Structured logging integration

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error types for the legal text store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Upstream document could not be parsed into any text unit
    #[error("Failed to parse document for code '{code}': {reason}")]
    Parse { code: String, reason: String },

    /// Embedding request exceeded its configured deadline
    #[error("Embedding request timed out after {timeout_secs}s")]
    EmbeddingTimeout { timeout_secs: u64 },

    /// Embedding service rejected or failed the request
    #[error("Embedding service error: {reason}")]
    EmbeddingService {
        status: Option<u16>,
        reason: String,
    },

    /// Embedding service rate limit hit
    #[error("Embedding service rate limit exceeded")]
    RateLimited { retry_after_seconds: Option<u64> },

    /// Storage constraint or connectivity failure
    #[error("Storage error: {reason}")]
    Storage { reason: String },

    /// Caller-supplied parameter out of contract
    #[error("Validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Requested code/section has no matching data
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Network failure talking to an upstream service
    #[error("Network error: {reason}")]
    Network { reason: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    /// Check if the error is transient and eligible for retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::EmbeddingTimeout { .. }
                | StoreError::RateLimited { .. }
                | StoreError::Network { .. }
                | StoreError::EmbeddingService {
                    status: Some(500..=599),
                    ..
                }
                | StoreError::EmbeddingService { status: None, .. }
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            StoreError::Parse { .. } => "parse",
            StoreError::EmbeddingTimeout { .. }
            | StoreError::EmbeddingService { .. }
            | StoreError::RateLimited { .. } => "embedding",
            StoreError::Storage { .. } => "storage",
            StoreError::Validation { .. } => "validation",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Network { .. } => "network",
            StoreError::Config { .. } => "configuration",
            StoreError::Internal { .. } => "internal",
        }
    }

    /// Shorthand for validation failures
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for storage failures
    pub fn storage(reason: impl std::fmt::Display) -> Self {
        StoreError::Storage {
            reason: reason.to_string(),
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::EmbeddingTimeout { timeout_secs: 0 }
        } else {
            StoreError::Network {
                reason: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Internal {
            message: format!("JSON serialization error: {}", err),
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Storage {
            reason: format!("Binary serialization error: {}", err),
        }
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Storage {
            reason: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::Config {
            message: format!("TOML parse error: {}", err),
        }
    }
}
