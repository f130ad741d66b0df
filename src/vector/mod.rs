//! Vector layer: embeddings, exact L2 search, and vector snapshots.
//!
//! This module knows nothing about documents, tenants or knowledge bases.
//! It turns text into fixed-length vectors, keeps vectors in a flat
//! in-memory index, and reads/writes the `<name>.index` snapshot file.
//!
//! # Architecture
//! - [`EmbeddingGenerator`]: text to vectors, one shared instance per process
//! - [`FlatIndex`]: brute-force squared-L2 k-nearest-neighbor search
//! - [`VectorSnapshotFile`]: atomic, length-checked binary snapshot of an index

mod embedding;
mod engine;
mod storage;
mod types;

// Re-export core types for public API
pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, HashEmbeddingGenerator, embedder_from_config,
    model_to_string, parse_embedding_model,
};
pub use engine::{FlatIndex, Neighbor};
pub(crate) use storage::{hex_digest, remove_if_exists, write_atomically};
pub use storage::{LoadedVectors, VectorSnapshotFile, VectorStorageError};
pub use types::{Distance, VECTOR_DIMENSION_384, VectorDimension, VectorError, squared_l2};
