use dualrag::config::CollectionsConfig;
use dualrag::{HashEmbeddingGenerator, KnowledgeRetriever, TextChunker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A throwaway data directory with a retriever over the offline hash embedder.
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("collections")
    }

    /// A fresh retriever over the same directory, as after a process restart.
    pub fn retriever(&self) -> KnowledgeRetriever {
        let chunker = TextChunker::new(300, 50).expect("valid chunker");
        KnowledgeRetriever::new(
            Arc::new(HashEmbeddingGenerator::default()),
            self.data_dir(),
            chunker,
            CollectionsConfig::default(),
        )
        .expect("Failed to create retriever")
    }

    pub fn artifact(&self, name: &str, extension: &str) -> PathBuf {
        self.data_dir().join(format!("{name}.{extension}"))
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
