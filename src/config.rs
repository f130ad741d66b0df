//! Configuration module for the retrieval engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DUALRAG_` and use double
//! underscores to separate nested levels:
//! - `DUALRAG_CHUNKING__CHUNK_SIZE=500` sets `chunking.chunk_size`
//! - `DUALRAG_STORAGE__DATA_DIR=/var/lib/dualrag` sets `storage.data_dir`
//! - `DUALRAG_RETRIEVAL__TOP_K_FACTS=5` sets `retrieval.top_k_facts`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory, relative to the workspace root, holding settings and data.
pub const CONFIG_DIR: &str = ".dualrag";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "DUALRAG_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },

    #[error("Failed to write configuration to '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuration file already exists at '{0}'. Use --force to overwrite")]
    AlreadyExists(PathBuf),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Where collection snapshots live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking of long fact documents
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Base names of the three knowledge-base collections
    #[serde(default)]
    pub collections: CollectionsConfig,

    /// Default retrieval depth and approval threshold
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Prompt assembly for drafted replies
    #[serde(default)]
    pub draft: DraftConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Directory holding every `<name>.index` / `<name>.pkl` pair
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Where downloaded model files are cached
    #[serde(default = "default_models_dir")]
    pub cache_dir: PathBuf,

    /// Texts per inference batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Show a progress bar while the model downloads
    #[serde(default)]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CollectionsConfig {
    /// Historical emails, used for tone and style
    #[serde(default = "default_style_collection")]
    pub style: String,

    /// Enrollment documents, used for facts
    #[serde(default = "default_facts_collection")]
    pub facts: String,

    /// Corrections of known mistakes
    #[serde(default = "default_corrections_collection")]
    pub corrections: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k_style")]
    pub top_k_style: usize,

    #[serde(default = "default_top_k_facts")]
    pub top_k_facts: usize,

    #[serde(default = "default_top_k_corrections")]
    pub top_k_corrections: usize,

    /// Minimum confidence for a draft to be auto-approved
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DraftConfig {
    /// Opening instruction used when a tenant has no custom system prompt
    #[serde(default = "default_base_instruction")]
    pub base_instruction: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("collections")
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("dualrag").join("models"))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("models"))
}
fn default_batch_size() -> usize {
    256
}
fn default_chunk_size() -> usize {
    300
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_style_collection() -> String {
    "historical_emails_collection".to_string()
}
fn default_facts_collection() -> String {
    "enrollment_docs_collection".to_string()
}
fn default_corrections_collection() -> String {
    "corrections_collection".to_string()
}
fn default_top_k_style() -> usize {
    2
}
fn default_top_k_facts() -> usize {
    3
}
fn default_top_k_corrections() -> usize {
    2
}
fn default_confidence_threshold() -> f32 {
    0.9
}
fn default_base_instruction() -> String {
    "Sei un assistente email per l'ufficio iscrizioni.".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            collections: CollectionsConfig::default(),
            retrieval: RetrievalConfig::default(),
            draft: DraftConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            cache_dir: default_models_dir(),
            batch_size: default_batch_size(),
            show_download_progress: false,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            style: default_style_collection(),
            facts: default_facts_collection(),
            corrections: default_corrections_collection(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_style: default_top_k_style(),
            top_k_facts: default_top_k_facts(),
            top_k_corrections: default_top_k_corrections(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            base_instruction: default_base_instruction(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, ConfigError> {
        // Try to find the workspace root by looking for .dualrag directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Use double underscore (__) to separate nested levels
            // Single underscore (_) remains as is within field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Find the settings file by looking for a .dualrag directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid { reason });

        if self.chunking.chunk_size == 0 {
            return invalid("chunking.chunk_size must be positive".to_string());
        }
        if self.chunking.chunk_overlap == 0 {
            return invalid("chunking.chunk_overlap must be positive".to_string());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return invalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be positive".to_string());
        }

        let names = [
            &self.collections.style,
            &self.collections.facts,
            &self.collections.corrections,
        ];
        for name in names {
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return invalid(format!(
                    "collection name '{name}' must be non-empty and use only [A-Za-z0-9_-]"
                ));
            }
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return invalid("collection names must be distinct".to_string());
        }

        let threshold = self.retrieval.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return invalid(format!(
                "retrieval.confidence_threshold must be within [0, 1], got {threshold}"
            ));
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let toml_string = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, toml_string).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");
        Self::write_template(&config_path, force)?;
        Ok(config_path)
    }

    /// Write the commented settings template to `path`.
    pub fn write_template(path: &Path, force: bool) -> Result<(), ConfigError> {
        if !force && path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let defaults = Settings::default();
        let template = format!(
            r#"# dualrag configuration file

# Version of the configuration schema
version = 1

[storage]
# Directory holding <collection>.index and <collection>.pkl snapshots
data_dir = "{data_dir}"

[embedding]
# fastembed model; AllMiniLML6V2 produces 384-dimensional vectors
model = "{model}"

# Where model files are downloaded on first use
cache_dir = "{cache_dir}"

# Texts per inference batch
batch_size = {batch_size}
show_download_progress = false

[chunking]
# Fact documents are split into overlapping character windows
chunk_size = {chunk_size}
chunk_overlap = {chunk_overlap}

[collections]
# Base names; tenant collections append "_ws<tenant>"
style = "{style}"
facts = "{facts}"
corrections = "{corrections}"

[retrieval]
top_k_style = {k_style}
top_k_facts = {k_facts}
top_k_corrections = {k_corrections}

# Drafts at or above this confidence may be approved automatically
confidence_threshold = {threshold}

[draft]
base_instruction = "{instruction}"
"#,
            data_dir = defaults.storage.data_dir.display(),
            model = defaults.embedding.model,
            cache_dir = defaults.embedding.cache_dir.display(),
            batch_size = defaults.embedding.batch_size,
            chunk_size = defaults.chunking.chunk_size,
            chunk_overlap = defaults.chunking.chunk_overlap,
            style = defaults.collections.style,
            facts = defaults.collections.facts,
            corrections = defaults.collections.corrections,
            k_style = defaults.retrieval.top_k_style,
            k_facts = defaults.retrieval.top_k_facts,
            k_corrections = defaults.retrieval.top_k_corrections,
            threshold = defaults.retrieval.confidence_threshold,
            instruction = defaults.draft.base_instruction,
        );

        std::fs::write(path, template).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
