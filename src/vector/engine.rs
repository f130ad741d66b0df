//! Exact nearest-neighbor search over an append-only set of vectors.
//!
//! [`FlatIndex`] keeps every vector in one contiguous row-major buffer and
//! answers queries by brute force: the squared L2 distance to every stored
//! vector is computed, and the `k` smallest are returned in ascending order.
//! Exact ties are broken by insertion order, so results are deterministic.
//!
//! Large indexes compute distances in parallel with rayon; small ones stay
//! on the calling thread where the fork/join overhead would dominate.

use rayon::prelude::*;

use crate::vector::{Distance, VectorDimension, VectorError, squared_l2};

/// Number of stored vectors above which distance computation is parallelized.
const PARALLEL_THRESHOLD: usize = 4_096;

/// One search result: the insertion position of a stored vector and its
/// distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: Distance,
}

/// In-memory brute-force L2 index.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: VectorDimension,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Creates an empty index for vectors of `dimension`.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Rebuilds an index from row-major data, e.g. a loaded snapshot.
    pub fn from_data(dimension: VectorDimension, data: Vec<f32>) -> Result<Self, VectorError> {
        if data.len() % dimension.get() != 0 {
            return Err(VectorError::InvalidFormat(format!(
                "{} values is not a multiple of dimension {dimension}",
                data.len()
            )));
        }
        Ok(Self { dimension, data })
    }

    /// Appends vectors in order.
    ///
    /// Every vector is validated before any is appended, so a dimension
    /// mismatch leaves the index unchanged.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), VectorError> {
        for vector in vectors {
            self.dimension.validate_vector(vector)?;
            ensure_finite(vector, "Embedding")?;
        }

        self.data.reserve(vectors.len() * self.dimension.get());
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Drops every vector at or after `len`. Used to roll back a failed append.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension.get());
    }

    /// Removes all vectors.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Returns the `min(k, len)` nearest vectors to `query`, closest first.
    ///
    /// An empty index yields an empty result, not an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorError> {
        self.dimension.validate_vector(query)?;
        ensure_finite(query, "Query")?;

        let count = self.len();
        if count == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let dim = self.dimension.get();
        let mut scored: Vec<(f32, usize)> = if count >= PARALLEL_THRESHOLD {
            self.data
                .par_chunks_exact(dim)
                .enumerate()
                .map(|(position, vector)| (squared_l2(query, vector), position))
                .collect()
        } else {
            self.data
                .chunks_exact(dim)
                .enumerate()
                .map(|(position, vector)| (squared_l2(query, vector), position))
                .collect()
        };

        let by_distance_then_position =
            |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));

        let k = k.min(count);
        if k < count {
            scored.select_nth_unstable_by(k - 1, by_distance_then_position);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance_then_position);

        scored
            .into_iter()
            .map(|(distance, position)| {
                // Rounding can leave a tiny negative value on exact matches.
                Ok(Neighbor {
                    position,
                    distance: Distance::new(distance.max(0.0))?,
                })
            })
            .collect()
    }

    /// Returns the stored vector at `position`.
    #[must_use]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let dim = self.dimension.get();
        self.data.get(position * dim..(position + 1) * dim)
    }

    /// Gets the number of indexed vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension.get()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Row-major view of all stored vectors.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

fn ensure_finite(vector: &[f32], what: &str) -> Result<(), VectorError> {
    if vector.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(VectorError::EmbeddingFailed(format!(
            "{what} contains non-finite values"
        )))
    }
}
