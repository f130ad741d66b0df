//! Multi-collection vector retrieval engine for retrieval-augmented email drafting.
//!
//! Text is chunked, embedded and appended to per-tenant collections for three
//! knowledge bases (writing style, enrollment facts, corrections). Queries fan
//! out to all three and come back as labeled, distance-ranked hits with a
//! confidence score.

pub mod chunking;
pub mod collection;
pub mod config;
pub mod display;
pub mod draft;
pub mod error;
pub mod retrieve;
pub mod vector;

// Explicit exports for better API clarity
pub use chunking::{SourceDocument, TextChunker, load_text_documents};
pub use collection::{
    Collection, CollectionError, CollectionId, CollectionManager, Correction, DocumentRecord,
    FactDocument, KnowledgeBase, LoadOutcome, Metadata, MetadataValue, SearchHit, StyleExample,
    TenantId,
};
pub use config::Settings;
pub use draft::{Draft, DraftRequest, ResponseDrafter, TextGenerator};
pub use error::{RagError, RagResult};
pub use retrieve::{KnowledgeRetriever, RetrievalResult, RetrieverStats, TopK, confidence};
pub use vector::{
    EmbeddingGenerator, FastEmbedGenerator, FlatIndex, HashEmbeddingGenerator, VectorDimension,
    VectorError,
};
