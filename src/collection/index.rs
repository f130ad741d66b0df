//! A persisted collection: flat vector index plus position-aligned documents.
//!
//! All state sits behind one `RwLock`, so `count() == documents == metadatas
//! == vectors` holds for every reader. Writers (`add`, `clear`) take the
//! write lock for the whole in-memory update and snapshot rewrite.
//!
//! # Persistence
//!
//! Each append rewrites `<name>.index` and then `<name>.pkl`, each file
//! replaced atomically. The `.pkl` pins the SHA-256 of the `.index` it was
//! written against, so a crash between the two renames is detected on the
//! next load instead of pairing documents with the wrong vectors.
//!
//! # Recovery
//!
//! Opening a collection whose snapshot is unreadable, truncated, has only
//! one of its two files, or whose files disagree with each other does not
//! fail: both files are deleted and the collection starts empty. The caller
//! learns about it through [`LoadOutcome::Recovered`]. A snapshot written
//! for a different embedding dimension is a configuration error and is
//! returned as [`VectorError::DimensionMismatch`].

use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, error, warn};

use crate::collection::CollectionError;
use crate::collection::identity::CollectionId;
use crate::collection::record::{DocumentRecord, Metadata, SearchHit, validate_metadata};
use crate::collection::snapshot::DocumentSnapshotFile;
use crate::vector::{FlatIndex, VectorDimension, VectorError, VectorSnapshotFile};

/// How a collection came into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No snapshot existed; the collection is new and empty.
    Created,
    /// Both snapshot files were read and agree.
    Loaded { count: usize },
    /// The snapshot was corrupt and has been discarded.
    Recovered { reason: String },
}

#[derive(Debug)]
struct CollectionState {
    index: FlatIndex,
    documents: Vec<String>,
    metadatas: Vec<Metadata>,
}

impl CollectionState {
    fn empty(dimension: VectorDimension) -> Self {
        Self {
            index: FlatIndex::new(dimension),
            documents: Vec::new(),
            metadatas: Vec::new(),
        }
    }

    fn truncate(&mut self, len: usize) {
        self.index.truncate(len);
        self.documents.truncate(len);
        self.metadatas.truncate(len);
    }
}

/// One named collection and its two snapshot files.
#[derive(Debug)]
pub struct Collection {
    id: CollectionId,
    dimension: VectorDimension,
    vectors_file: VectorSnapshotFile,
    documents_file: DocumentSnapshotFile,
    state: RwLock<CollectionState>,
}

impl Collection {
    /// Loads the collection from `dir`, or creates it empty.
    pub fn open(
        dir: &Path,
        id: CollectionId,
        dimension: VectorDimension,
    ) -> Result<(Self, LoadOutcome), CollectionError> {
        let vectors_file = VectorSnapshotFile::new(dir, id.name());
        let documents_file = DocumentSnapshotFile::new(dir, id.name());

        let mut collection = Self {
            id,
            dimension,
            vectors_file,
            documents_file,
            state: RwLock::new(CollectionState::empty(dimension)),
        };

        let mut state = CollectionState::empty(dimension);
        let outcome = collection.load_into(&mut state)?;
        *collection.state.get_mut() = state;

        Ok((collection, outcome))
    }

    /// `None` when no snapshot exists, `Some(Err(reason))` when it is corrupt.
    ///
    /// Only a dimension mismatch escapes as an error.
    fn load_snapshot(&self) -> Result<Option<Result<CollectionState, String>>, CollectionError> {
        let has_vectors = self.vectors_file.exists();
        let has_documents = self.documents_file.exists();

        match (has_vectors, has_documents) {
            (false, false) => return Ok(None),
            (true, false) => {
                return Ok(Some(Err(format!(
                    "'{}' exists without '{}'",
                    self.vectors_file.path().display(),
                    self.documents_file.path().display()
                ))));
            }
            (false, true) => {
                return Ok(Some(Err(format!(
                    "'{}' exists without '{}'",
                    self.documents_file.path().display(),
                    self.vectors_file.path().display()
                ))));
            }
            (true, true) => {}
        }

        let loaded = match self.vectors_file.read() {
            Ok(loaded) => loaded,
            Err(e) => return Ok(Some(Err(format!("unreadable vector snapshot: {e}")))),
        };
        let snapshot = match self.documents_file.read() {
            Ok(snapshot) => snapshot,
            Err(e) => return Ok(Some(Err(format!("unreadable document snapshot: {e}")))),
        };

        if snapshot.index_sha256 != loaded.digest {
            return Ok(Some(Err(
                "document snapshot was written for a different vector snapshot".to_string(),
            )));
        }
        if snapshot.vector_count != loaded.count || snapshot.dimension != loaded.dimension.get() {
            return Ok(Some(Err(format!(
                "document snapshot describes {} vectors of dimension {}, vector snapshot holds {} of dimension {}",
                snapshot.vector_count,
                snapshot.dimension,
                loaded.count,
                loaded.dimension
            ))));
        }

        if loaded.dimension != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension.get(),
                actual: loaded.dimension.get(),
            }
            .into());
        }

        let index = match FlatIndex::from_data(loaded.dimension, loaded.data) {
            Ok(index) => index,
            Err(e) => return Ok(Some(Err(e.to_string()))),
        };

        Ok(Some(Ok(CollectionState {
            index,
            documents: snapshot.documents,
            metadatas: snapshot.metadatas,
        })))
    }

    /// Appends vectors with their documents and metadata, then persists.
    ///
    /// The three inputs must have equal length. If the snapshot cannot be
    /// written the append is rolled back and the error returned, so memory
    /// never holds data the disk does not. Returns the new count.
    pub fn add(
        &self,
        vectors: &[Vec<f32>],
        documents: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<usize, CollectionError> {
        if vectors.len() != documents.len() || vectors.len() != metadatas.len() {
            return Err(VectorError::LengthMismatch {
                vectors: vectors.len(),
                documents: documents.len(),
                metadatas: metadatas.len(),
            }
            .into());
        }

        for metadata in &metadatas {
            validate_metadata(metadata)?;
        }

        let mut state = self.state.write();
        if vectors.is_empty() {
            return Ok(state.documents.len());
        }

        let previous = state.documents.len();
        state.index.add(vectors)?;
        state.documents.extend(documents);
        state.metadatas.extend(metadatas);

        if let Err(e) = self.persist(&state) {
            state.truncate(previous);
            self.restore_vectors(&state);
            return Err(e);
        }

        let count = state.documents.len();
        debug!(collection = %self.id, added = vectors.len(), count, "Appended documents");
        Ok(count)
    }

    /// Convenience wrapper over [`Collection::add`] for typed records.
    pub fn add_records(
        &self,
        vectors: &[Vec<f32>],
        records: Vec<DocumentRecord>,
    ) -> Result<usize, CollectionError> {
        let (documents, metadatas) = records
            .into_iter()
            .map(|record| (record.text, record.metadata))
            .unzip();
        self.add(vectors, documents, metadatas)
    }

    fn persist(&self, state: &CollectionState) -> Result<(), CollectionError> {
        let digest = self
            .vectors_file
            .write(self.dimension, state.index.as_slice())
            .map_err(VectorError::from)?;
        self.documents_file.write(
            self.dimension.get(),
            &digest,
            &state.documents,
            &state.metadatas,
        )?;
        debug!(
            collection = %self.id,
            count = state.documents.len(),
            "Wrote collection snapshot"
        );
        Ok(())
    }

    /// Puts the `.index` back in line with the `.pkl` still on disk after a
    /// failed persist. The vector codec is deterministic, so rewriting the
    /// rolled-back state reproduces the digest the old `.pkl` pins.
    fn restore_vectors(&self, state: &CollectionState) {
        if state.documents.is_empty() && !self.documents_file.exists() {
            if let Err(e) = self.vectors_file.remove() {
                error!(collection = %self.id, error = %e, "Failed to remove orphaned vector snapshot");
            }
            return;
        }
        if let Err(e) = self
            .vectors_file
            .write(self.dimension, state.index.as_slice())
        {
            error!(
                collection = %self.id,
                error = %e,
                "Failed to restore vector snapshot; next load will discard the collection"
            );
        }
    }

    /// Re-reads the snapshot from disk into this instance.
    ///
    /// Used after the files were replaced underneath an open collection, so
    /// every holder of this instance sees the new contents. Corrupt files are
    /// recovered as in [`Collection::open`].
    pub fn reload(&self) -> Result<LoadOutcome, CollectionError> {
        let mut state = self.state.write();
        self.load_into(&mut state)
    }

    /// Runs `replace` under the write lock, then reloads from disk. No append
    /// can interleave between the file swap and the reload.
    pub(crate) fn replace_files<T>(
        &self,
        replace: impl FnOnce() -> Result<T, CollectionError>,
    ) -> Result<(T, LoadOutcome), CollectionError> {
        let mut state = self.state.write();
        let replaced = replace()?;
        let outcome = self.load_into(&mut state)?;
        Ok((replaced, outcome))
    }

    fn load_into(&self, state: &mut CollectionState) -> Result<LoadOutcome, CollectionError> {
        let outcome = match self.load_snapshot()? {
            Some(Ok(loaded)) => {
                let count = loaded.documents.len();
                *state = loaded;
                LoadOutcome::Loaded { count }
            }
            Some(Err(reason)) => {
                warn!(
                    collection = %self.id,
                    %reason,
                    "Discarding corrupt collection snapshot; collection starts empty"
                );
                self.remove_files()?;
                *state = CollectionState::empty(self.dimension);
                LoadOutcome::Recovered { reason }
            }
            None => {
                *state = CollectionState::empty(self.dimension);
                LoadOutcome::Created
            }
        };
        Ok(outcome)
    }

    /// Returns up to `k` nearest documents, closest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, CollectionError> {
        let state = self.state.read();
        let neighbors = state.index.search(query, k)?;

        Ok(neighbors
            .into_iter()
            .map(|neighbor| SearchHit {
                document: state.documents[neighbor.position].clone(),
                metadata: state.metadatas[neighbor.position].clone(),
                distance: neighbor.distance,
            })
            .collect())
    }

    /// Empties the collection and deletes both snapshot files.
    pub fn clear(&self) -> Result<(), CollectionError> {
        let mut state = self.state.write();
        *state = CollectionState::empty(self.dimension);
        self.remove_files()?;
        debug!(collection = %self.id, "Cleared collection");
        Ok(())
    }

    /// Runs `f` while holding the read lock, so no writer can touch the
    /// snapshot files meanwhile.
    pub(crate) fn with_read_lock<T>(&self, f: impl FnOnce() -> T) -> T {
        let _state = self.state.read();
        f()
    }

    fn remove_files(&self) -> Result<bool, CollectionError> {
        let removed_vectors =
            self.vectors_file
                .remove()
                .map_err(|source| CollectionError::Io {
                    path: self.vectors_file.path().to_path_buf(),
                    source,
                })?;
        let removed_documents = self.documents_file.remove()?;
        Ok(removed_vectors || removed_documents)
    }

    pub fn count(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn id(&self) -> &CollectionId {
        &self.id
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    pub fn vectors_path(&self) -> &Path {
        self.vectors_file.path()
    }

    pub fn documents_path(&self) -> &Path {
        self.documents_file.path()
    }
}
