//! Document snapshot for a collection (`<name>.pkl`).
//!
//! Holds the documents and metadata position-aligned with the vector
//! snapshot, together with the SHA-256 of the `.index` file it was written
//! against. A document snapshot whose digest or counts disagree with the
//! vector snapshot next to it is treated as corrupt.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::collection::CollectionError;
use crate::collection::record::Metadata;
use crate::vector::{remove_if_exists, write_atomically};

/// Document snapshot file extension.
pub const EXTENSION: &str = "pkl";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Decoded contents of a `.pkl` file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentSnapshot {
    pub version: u32,
    pub dimension: usize,
    pub vector_count: usize,
    pub index_sha256: String,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

/// Borrowed view written to disk, so saving never clones the documents.
#[derive(Serialize)]
struct DocumentSnapshotRef<'a> {
    version: u32,
    dimension: usize,
    vector_count: usize,
    index_sha256: &'a str,
    documents: &'a [String],
    metadatas: &'a [Metadata],
}

/// Handle to one collection's document snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshotFile {
    path: PathBuf,
}

impl DocumentSnapshotFile {
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{name}.{EXTENSION}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads and version-checks the snapshot.
    pub fn read(&self) -> Result<DocumentSnapshot, CollectionError> {
        let json = std::fs::read(&self.path).map_err(|source| CollectionError::Io {
            path: self.path.clone(),
            source,
        })?;

        let snapshot: DocumentSnapshot = serde_json::from_slice(&json).map_err(|e| {
            CollectionError::Snapshot(format!(
                "Failed to parse '{}': {e}",
                self.path.display()
            ))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CollectionError::Snapshot(format!(
                "Snapshot version {} is not supported (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        if snapshot.documents.len() != snapshot.metadatas.len()
            || snapshot.documents.len() != snapshot.vector_count
        {
            return Err(CollectionError::Snapshot(format!(
                "Snapshot holds {} documents and {} metadata entries for {} vectors",
                snapshot.documents.len(),
                snapshot.metadatas.len(),
                snapshot.vector_count
            )));
        }

        Ok(snapshot)
    }

    /// Atomically replaces the snapshot.
    pub fn write(
        &self,
        dimension: usize,
        index_sha256: &str,
        documents: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), CollectionError> {
        let snapshot = DocumentSnapshotRef {
            version: SNAPSHOT_VERSION,
            dimension,
            vector_count: documents.len(),
            index_sha256,
            documents,
            metadatas,
        };

        let json = serde_json::to_vec(&snapshot).map_err(|e| {
            CollectionError::Snapshot(format!("Failed to serialize documents: {e}"))
        })?;

        write_atomically(&self.path, &json).map_err(|source| CollectionError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Deletes the file; absent files are not an error.
    pub fn remove(&self) -> Result<bool, CollectionError> {
        remove_if_exists(&self.path).map_err(|source| CollectionError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
