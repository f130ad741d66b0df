//! Registry of open collections, keyed by collection name.
//!
//! The manager guarantees at most one [`Collection`] per identity within the
//! process and owns the whole-collection file lifecycle used for tenant
//! decommissioning and cloning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::collection::snapshot::DocumentSnapshotFile;
use crate::collection::{Collection, CollectionError, CollectionId, LoadOutcome};
use crate::vector::{VectorDimension, VectorSnapshotFile, write_atomically};

#[derive(Debug)]
pub struct CollectionManager {
    data_dir: PathBuf,
    dimension: VectorDimension,
    collections: DashMap<String, Arc<Collection>>,
}

impl CollectionManager {
    /// Creates the data directory if needed.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        dimension: VectorDimension,
    ) -> Result<Self, CollectionError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|source| CollectionError::Io {
            path: data_dir.clone(),
            source,
        })?;

        Ok(Self {
            data_dir,
            dimension,
            collections: DashMap::new(),
        })
    }

    /// Returns the cached collection, or loads (or creates) and caches it.
    ///
    /// Concurrent callers for the same identity all receive the same
    /// instance; the snapshot is read once.
    pub fn get_or_create(&self, id: &CollectionId) -> Result<Arc<Collection>, CollectionError> {
        if let Some(existing) = self.collections.get(id.name()) {
            return Ok(Arc::clone(existing.value()));
        }

        let entry = self
            .collections
            .entry(id.name().to_string())
            .or_try_insert_with(|| {
                let (collection, outcome) =
                    Collection::open(&self.data_dir, id.clone(), self.dimension)?;
                match outcome {
                    LoadOutcome::Created => debug!(collection = %id, "Created collection"),
                    LoadOutcome::Loaded { count } => {
                        info!(collection = %id, count, "Loaded collection")
                    }
                    // Already reported by Collection::open
                    LoadOutcome::Recovered { .. } => {}
                }
                Ok::<_, CollectionError>(Arc::new(collection))
            })?;

        Ok(Arc::clone(entry.value()))
    }

    /// Removes both snapshot files for `id`, whether or not it is open.
    ///
    /// An open instance stays registered and is emptied in place, so callers
    /// still holding it keep sharing the one instance for this identity.
    /// Absent files are not an error. Returns whether anything was removed
    /// from disk.
    pub fn delete_all_artifacts(&self, id: &CollectionId) -> Result<bool, CollectionError> {
        let had_files = self.artifacts_exist(id);

        let vectors = VectorSnapshotFile::new(&self.data_dir, id.name());
        let removed_vectors = vectors.remove().map_err(|source| CollectionError::Io {
            path: vectors.path().to_path_buf(),
            source,
        })?;
        let removed_documents = DocumentSnapshotFile::new(&self.data_dir, id.name()).remove()?;

        if let Some(open) = self.open_instance(id) {
            open.clear()?;
        }

        let removed = had_files || removed_vectors || removed_documents;
        if removed {
            info!(collection = %id, "Deleted collection artifacts");
        }
        Ok(removed)
    }

    /// Byte-copies the snapshot of `source` to `target`.
    ///
    /// Returns the number of files copied: 2, or 0 when `source` has no
    /// complete snapshot on disk, in which case `target` is left untouched.
    /// The source is read under its read lock and the target is replaced and
    /// reloaded under its write lock, so the registered `target` instance
    /// reflects the copy and no append on either side can tear it.
    pub fn duplicate_artifacts(
        &self,
        source: &CollectionId,
        target: &CollectionId,
    ) -> Result<usize, CollectionError> {
        if source == target {
            return Err(CollectionError::InvalidIdentity {
                name: target.name().to_string(),
                reason: "cannot duplicate a collection onto itself",
            });
        }

        let source_collection = self.get_or_create(source)?;
        let Some((vectors, documents)) =
            source_collection.with_read_lock(|| self.read_artifacts(source))?
        else {
            return Ok(0);
        };

        let target_collection = self.get_or_create(target)?;
        let ((), outcome) = target_collection.replace_files(|| {
            let dst_vectors = VectorSnapshotFile::new(&self.data_dir, target.name());
            let dst_documents = DocumentSnapshotFile::new(&self.data_dir, target.name());
            write_file(dst_vectors.path(), &vectors)?;
            write_file(dst_documents.path(), &documents)
        })?;

        info!(
            source = %source,
            target = %target,
            ?outcome,
            "Duplicated collection artifacts"
        );
        Ok(2)
    }

    /// Both snapshot files of `id`, or `None` when the snapshot is absent
    /// or incomplete.
    fn read_artifacts(
        &self,
        id: &CollectionId,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, CollectionError> {
        let vectors = VectorSnapshotFile::new(&self.data_dir, id.name());
        let documents = DocumentSnapshotFile::new(&self.data_dir, id.name());

        match (vectors.exists(), documents.exists()) {
            (true, true) => {}
            (false, false) => {
                debug!(collection = %id, "Nothing to duplicate");
                return Ok(None);
            }
            _ => {
                warn!(collection = %id, "Skipping duplicate of incomplete snapshot");
                return Ok(None);
            }
        }

        Ok(Some((read_file(vectors.path())?, read_file(documents.path())?)))
    }

    fn open_instance(&self, id: &CollectionId) -> Option<Arc<Collection>> {
        self.collections
            .get(id.name())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Whether either snapshot file exists for `id`.
    pub fn artifacts_exist(&self, id: &CollectionId) -> bool {
        VectorSnapshotFile::new(&self.data_dir, id.name()).exists()
            || DocumentSnapshotFile::new(&self.data_dir, id.name()).exists()
    }

    pub fn is_open(&self, id: &CollectionId) -> bool {
        self.collections.contains_key(id.name())
    }

    pub fn open_count(&self) -> usize {
        self.collections.len()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, CollectionError> {
    std::fs::read(path).map_err(|source| CollectionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CollectionError> {
    write_atomically(path, bytes).map_err(|source| CollectionError::Io {
        path: path.to_path_buf(),
        source,
    })
}
