//! Error types for the retrieval engine
//!
//! This module provides the crate-level error type returned by the
//! retrieval façade and the CLI. Lower layers keep their own error enums
//! ([`VectorError`], [`CollectionError`], [`ChunkingError`], [`ConfigError`])
//! and convert into [`RagError`] with `?`.

use thiserror::Error;

use crate::chunking::ChunkingError;
use crate::collection::CollectionError;
use crate::config::ConfigError;
use crate::vector::VectorError;

/// Main error type for retrieval and indexing operations
#[derive(Error, Debug)]
pub enum RagError {
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    /// The language model could not produce a draft
    #[error("Text generation failed: {0}")]
    Generation(String),

    /// Indexing input yielded nothing to embed
    #[error("Nothing to index: {reason}")]
    NothingToIndex { reason: String },
}

impl RagError {
    /// Get a status code for the error (for CLI exit codes and JSON output)
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(VectorError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Self::Vector(VectorError::EmbeddingFailed(_)) => "EMBEDDING_FAILED",
            Self::Vector(VectorError::EmptyInput) => "EMPTY_INPUT",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::Collection(CollectionError::Vector(VectorError::DimensionMismatch {
                ..
            })) => "DIMENSION_MISMATCH",
            Self::Collection(CollectionError::InvalidIdentity { .. }) => "INVALID_IDENTITY",
            Self::Collection(CollectionError::MissingField { .. }) => "MISSING_FIELD",
            Self::Collection(CollectionError::InvalidMetadata { .. }) => "INVALID_METADATA",
            Self::Collection(CollectionError::Io { .. }) => "STORAGE_ERROR",
            Self::Collection(_) => "COLLECTION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Chunking(_) => "CHUNKING_ERROR",
            Self::Generation(_) => "GENERATION_FAILED",
            Self::NothingToIndex { .. } => "NOTHING_TO_INDEX",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Vector(VectorError::DimensionMismatch { .. })
            | Self::Collection(CollectionError::Vector(VectorError::DimensionMismatch {
                ..
            })) => vec![
                "The stored collections were built with a different embedding model",
                "Restore the previous embedding.model setting, or clear and re-index the collections",
            ],
            Self::Vector(VectorError::EmbeddingFailed(_)) => vec![
                "Check that the embedding model downloaded completely",
                "Retry the operation; the model may have run out of memory",
            ],
            Self::Collection(CollectionError::Io { .. }) => vec![
                "Check disk space and permissions in the storage.data_dir directory",
            ],
            Self::Config(_) => vec![
                "Check .dualrag/settings.toml for typos",
                "Run 'dualrag init --force' to regenerate the default configuration",
            ],
            Self::Generation(_) => vec![
                "The language model service may be unavailable, try again later",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for façade operations
pub type RagResult<T> = Result<T, RagError>;
