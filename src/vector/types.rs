//! Type-safe wrappers and core types for the vector layer.
//!
//! Dimensions and distances get their own newtypes so that a raw `usize`
//! or `f32` never travels through the engine without validation.

use thiserror::Error;

/// Native output dimension of all-MiniLM-L6-v2, the default embedding model.
pub const VECTOR_DIMENSION_384: usize = 384;

/// Type-safe wrapper for vector dimensions.
///
/// Every index is created with one dimension and rejects vectors of any
/// other length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Squared Euclidean distance between two embeddings.
///
/// Lower is more similar; 0.0 is an exact match. Distances are never NaN,
/// which lets them be totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Distance(f32);

impl Distance {
    /// Creates a new `Distance` with validation.
    ///
    /// Returns an error if the value is negative or NaN.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidDistance {
                value,
                reason: "Distance cannot be NaN",
            });
        }
        if value < 0.0 {
            return Err(VectorError::InvalidDistance {
                value,
                reason: "Squared distance cannot be negative",
            });
        }
        Ok(Self(value))
    }

    /// Distance of a vector to itself.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Distance {}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Squared L2 distance between two equal-length vectors.
///
/// No normalization is applied; callers must validate dimensions first.
#[inline]
#[must_use]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid distance value: {value}\nReason: {reason}")]
    InvalidDistance { value: f32, reason: &'static str },

    #[error(
        "Batch length mismatch: {vectors} vectors, {documents} documents, {metadatas} metadata entries\nSuggestion: Build vectors, documents and metadata from the same record list"
    )]
    LengthMismatch {
        vectors: usize,
        documents: usize,
        metadatas: usize,
    },

    #[error("Cannot embed empty text\nSuggestion: Skip blank inputs before calling the embedder")]
    EmptyInput,

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error(
        "Serialization error: {0}\nSuggestion: Check that vector data is valid and not corrupted"
    )]
    Serialization(String),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Migrate the storage format or use a compatible version"
    )]
    VersionMismatch { expected: u32, actual: u32 },
}
