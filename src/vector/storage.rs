//! On-disk snapshot format for a collection's vectors (`<name>.index`).
//!
//! The snapshot is rewritten in full on every append and replaced
//! atomically: bytes go to a temporary file in the same directory, are
//! synced, and the temporary file is renamed over the old snapshot. A
//! crash therefore leaves either the previous snapshot or the new one,
//! never a torn file.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic, version, dimension, vector count
//! - Vectors: contiguous f32 arrays in little-endian format, in insertion order
//!
//! Loading goes through a read-only memory map and validates the exact
//! file length, so a truncated snapshot is detected before any vector is
//! decoded. The SHA-256 of the file is returned on both read and write so
//! the document snapshot can pin the exact vector file it belongs to.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use memmap2::MmapOptions;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::vector::types::{VectorDimension, VectorError};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify vector snapshot files.
const MAGIC_BYTES: &[u8; 4] = b"DVEC";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Errors specific to vector snapshot operations.
#[derive(Error, Debug)]
pub enum VectorStorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

impl From<VectorStorageError> for VectorError {
    fn from(err: VectorStorageError) -> Self {
        match err {
            VectorStorageError::Io(e) => VectorError::Storage(e),
            VectorStorageError::InvalidFormat(msg) => VectorError::InvalidFormat(msg),
            VectorStorageError::Vector(e) => e,
        }
    }
}

/// Vectors decoded from a snapshot file.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedVectors {
    pub dimension: VectorDimension,
    /// Row-major vector data, `count * dimension` values.
    pub data: Vec<f32>,
    pub count: usize,
    /// Hex SHA-256 of the whole file.
    pub digest: String,
}

/// Handle to one collection's vector snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSnapshotFile {
    path: PathBuf,
}

impl VectorSnapshotFile {
    /// File extension of vector snapshots.
    pub const EXTENSION: &'static str = "index";

    /// Snapshot file for `name` inside `dir`.
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            path: dir
                .as_ref()
                .join(format!("{name}.{}", Self::EXTENSION)),
        }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks if the snapshot exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns the size of the snapshot file in bytes.
    pub fn file_size(&self) -> Result<u64, io::Error> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Reads and validates the whole snapshot.
    pub fn read(&self) -> Result<LoadedVectors, VectorStorageError> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < HEADER_SIZE {
            return Err(VectorStorageError::InvalidFormat(format!(
                "File too small to contain header ({file_len} bytes)"
            )));
        }

        // SAFETY: the map is read-only and dropped before this function
        // returns; snapshot files are only ever replaced by rename, never
        // modified in place.
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let (version, dimension, count) = read_header(&mmap)?;
        if version != STORAGE_VERSION {
            return Err(VectorError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: version,
            }
            .into());
        }

        let expected_len = dimension
            .get()
            .checked_mul(count)
            .and_then(|n| n.checked_mul(BYTES_PER_F32))
            .and_then(|n| n.checked_add(HEADER_SIZE))
            .ok_or_else(|| {
                VectorStorageError::InvalidFormat("Header describes an impossible size".into())
            })?;
        if mmap.len() != expected_len {
            return Err(VectorStorageError::InvalidFormat(format!(
                "Expected {expected_len} bytes for {count} vectors of dimension {dimension}, found {}",
                mmap.len()
            )));
        }

        let data: Vec<f32> = mmap[HEADER_SIZE..]
            .chunks_exact(BYTES_PER_F32)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        if data.iter().any(|v| !v.is_finite()) {
            return Err(VectorStorageError::InvalidFormat(
                "Snapshot contains non-finite values".to_string(),
            ));
        }

        Ok(LoadedVectors {
            dimension,
            data,
            count,
            digest: hex_digest(&mmap),
        })
    }

    /// Atomically replaces the snapshot with `data`.
    ///
    /// `data` is row-major and must hold a whole number of vectors.
    /// Returns the hex SHA-256 of the bytes written.
    pub fn write(
        &self,
        dimension: VectorDimension,
        data: &[f32],
    ) -> Result<String, VectorStorageError> {
        if data.len() % dimension.get() != 0 {
            return Err(VectorStorageError::InvalidFormat(format!(
                "{} values is not a multiple of dimension {dimension}",
                data.len()
            )));
        }
        let count = data.len() / dimension.get();
        let count = u32::try_from(count).map_err(|_| {
            VectorStorageError::InvalidFormat(format!("Too many vectors for one snapshot: {count}"))
        })?;
        let dim = u32::try_from(dimension.get()).map_err(|_| {
            VectorStorageError::InvalidFormat(format!("Dimension too large: {dimension}"))
        })?;

        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len() * BYTES_PER_F32);
        bytes.extend_from_slice(MAGIC_BYTES);
        bytes.extend_from_slice(&STORAGE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&dim.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        for value in data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        write_atomically(&self.path, &bytes)?;
        Ok(hex_digest(&bytes))
    }

    /// Deletes the snapshot. Missing files are not an error.
    pub fn remove(&self) -> Result<bool, io::Error> {
        remove_if_exists(&self.path)
    }
}

fn read_header(bytes: &[u8]) -> Result<(u32, VectorDimension, usize), VectorStorageError> {
    if &bytes[0..4] != MAGIC_BYTES {
        return Err(VectorStorageError::InvalidFormat(
            "Invalid magic bytes".to_string(),
        ));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let dim_value = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let dimension = VectorDimension::new(dim_value as usize)?;
    let count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;

    Ok((version, dimension, count))
}

/// Hex-encoded SHA-256 of `bytes`.
pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Writes `bytes` to a sibling temp file, syncs it, and renames it over `path`.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), io::Error> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Removes a file, treating "not found" as success. Returns whether a file was removed.
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool, io::Error> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
