//! Splits long text into overlapping fixed-size character windows.
//!
//! Windows are measured in characters, not bytes, so multi-byte text is
//! never cut inside a code point. A window starts at offset 0 and each next
//! window starts `chunk_size - chunk_overlap` characters later; splitting
//! stops once a window reaches the end of the text. Chunks carry their
//! source's metadata only; their offsets are not recorded.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::collection::{DocumentRecord, Metadata};
use crate::config::ChunkingConfig;

/// File extensions picked up by [`load_text_documents`].
const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error(
        "Invalid chunking parameters: size {size}, overlap {overlap}\nSuggestion: Use a positive chunk_size larger than a positive chunk_overlap"
    )]
    InvalidParameters { size: usize, overlap: usize },

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// A plain-text document as handed over by a file loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub filename: String,
    pub path: PathBuf,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 || chunk_overlap == 0 || chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidParameters {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkingError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Lazily yields the windows of `text`. Empty text yields nothing.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            // Byte offset of every char boundary, plus the end of the text
            boundaries: text
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(text.len()))
                .collect(),
            start: 0,
            size: self.chunk_size,
            step: self.chunk_size - self.chunk_overlap,
            done: text.is_empty(),
        }
    }

    /// Chunks `text`, copying `metadata` onto every chunk.
    ///
    /// Whitespace-only windows are skipped.
    pub fn chunk_text(&self, text: &str, metadata: &Metadata) -> Vec<DocumentRecord> {
        self.chunks(text)
            .filter(|chunk| !chunk.trim().is_empty())
            .map(|chunk| DocumentRecord {
                text: chunk.to_string(),
                metadata: metadata.clone(),
            })
            .collect()
    }

    /// Chunks every document, tagging chunks with `filename` and `path`.
    pub fn chunk_documents(&self, documents: &[SourceDocument]) -> Vec<DocumentRecord> {
        let mut records = Vec::new();
        for document in documents {
            let mut metadata = Metadata::new();
            metadata.insert("filename".into(), document.filename.as_str().into());
            metadata.insert(
                "path".into(),
                document.path.to_string_lossy().into_owned().into(),
            );

            let chunks = self.chunk_text(&document.content, &metadata);
            debug!(
                filename = %document.filename,
                chunks = chunks.len(),
                "Chunked document"
            );
            records.extend(chunks);
        }
        records
    }
}

/// Iterator over the windows of one text; see [`TextChunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    boundaries: Vec<usize>,
    start: usize,
    size: usize,
    step: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let char_count = self.boundaries.len() - 1;
        let end = (self.start + self.size).min(char_count);
        let chunk = &self.text[self.boundaries[self.start]..self.boundaries[end]];

        if self.start + self.size >= char_count {
            self.done = true;
        } else {
            self.start += self.step;
        }
        Some(chunk)
    }
}

/// Reads every `.txt`/`.md` file under `root` (or `root` itself if a file).
///
/// Files are returned sorted by path. Unreadable or non-UTF-8 files are
/// reported as errors rather than skipped.
pub fn load_text_documents(root: &Path) -> Result<Vec<SourceDocument>, ChunkingError> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| ChunkingError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || !is_text_file(entry.path()) {
            continue;
        }

        let path = entry.path().to_path_buf();
        let content = std::fs::read_to_string(&path).map_err(|source| ChunkingError::Read {
            path: path.clone(),
            source,
        })?;
        documents.push(SourceDocument {
            filename: entry.file_name().to_string_lossy().into_owned(),
            path,
            content,
        });
    }

    Ok(documents)
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TEXT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}
