//! Collections: named, persisted vector indexes with their documents.
//!
//! - [`identity`]: collection names derived from knowledge base and tenant
//! - [`record`]: typed document records and search hits
//! - [`index`]: one persisted collection with locking and corruption recovery
//! - [`manager`]: the process-wide registry of open collections

pub mod identity;
pub mod index;
pub mod manager;
pub mod record;
pub mod snapshot;

use std::path::PathBuf;

use thiserror::Error;

use crate::vector::VectorError;

pub use identity::{CollectionId, KnowledgeBase, TenantId};
pub use index::{Collection, LoadOutcome};
pub use manager::CollectionManager;
pub use record::{
    Correction, DocumentRecord, FactDocument, Metadata, MetadataValue, SearchHit, StyleExample,
};

/// Errors raised by the collection layer.
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error("Invalid collection identity '{name}': {reason}")]
    InvalidIdentity { name: String, reason: &'static str },

    #[error("Missing required field '{field}'\nSuggestion: Provide a non-empty value")]
    MissingField { field: &'static str },

    #[error("Invalid metadata value for '{key}': {reason}\nSuggestion: Store only finite numbers, booleans and text")]
    InvalidMetadata { key: String, reason: &'static str },

    #[error("Document snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error on '{path}': {source}\nSuggestion: Check disk space and file permissions")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
