//! Embedding generation for the vector layer.
//!
//! The [`EmbeddingGenerator`] trait is the seam between the retrieval engine
//! and whatever produces vectors. Production code uses [`FastEmbedGenerator`],
//! which loads an ONNX sentence-transformer once and is then shared by every
//! collection through an `Arc<dyn EmbeddingGenerator>`. Tests and offline
//! tooling use [`HashEmbeddingGenerator`], a deterministic feature-hashing
//! embedder that needs no model download.
//!
//! Empty text is rejected with [`VectorError::EmptyInput`] rather than being
//! mapped to a zero vector; callers are expected to skip blank inputs.

use crate::vector::{VectorDimension, VectorError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe: one instance is shared by all
/// collections and all request threads of a process.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    ///
    /// # Arguments
    /// * `texts` - Slice of text strings to generate embeddings for
    ///
    /// # Returns
    /// A vector of embeddings, one for each input text in input order, or an error
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Human-readable model identifier, recorded in stats output.
    fn model_name(&self) -> &str;

    /// Embed a single text.
    ///
    /// # Errors
    /// Returns [`VectorError::EmptyInput`] for blank text, or the backend error.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        if text.trim().is_empty() {
            return Err(VectorError::EmptyInput);
        }
        let mut embeddings = self.generate_embeddings(&[text])?;
        let embedding = embeddings.pop().ok_or_else(|| {
            VectorError::EmbeddingFailed("Backend returned no embedding for input".to_string())
        })?;
        self.dimension().validate_vector(&embedding)?;
        Ok(embedding)
    }

    /// Embed many texts, preserving input order 1:1.
    fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(VectorError::EmptyInput);
        }
        let embeddings = self.generate_embeddings(texts)?;
        if embeddings.len() != texts.len() {
            return Err(VectorError::EmbeddingFailed(format!(
                "Backend returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        let dimension = self.dimension();
        for embedding in &embeddings {
            dimension.validate_vector(embedding)?;
        }
        Ok(embeddings)
    }
}

/// FastEmbed implementation backed by an ONNX sentence-transformer.
///
/// The model is loaded synchronously in the constructor; nothing can be
/// embedded until it returns. Inference goes through a mutex because
/// `TextEmbedding::embed` needs exclusive access.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
    model_name: String,
    batch_size: usize,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model", &"<TextEmbedding>")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Load the given model, downloading it into `cache_dir` on first use.
    ///
    /// The output dimension is probed with a test embedding instead of
    /// being hard-coded per model.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new(
        model: EmbeddingModel,
        cache_dir: PathBuf,
        show_download_progress: bool,
        batch_size: usize,
    ) -> Result<Self, VectorError> {
        let model_name = model_to_string(&model);
        info!(model = %model_name, cache_dir = %cache_dir.display(), "Loading embedding model");

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        let probe = text_model
            .embed(vec!["test"], None)
            .map_err(|e| VectorError::EmbeddingFailed(format!("Model probe failed: {e}")))?;
        let dimension = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| VectorError::EmbeddingFailed("Model probe returned nothing".into()))?;
        let dimension = VectorDimension::new(dimension)?;

        info!(model = %model_name, %dimension, "Embedding model loaded");

        Ok(Self {
            model: Mutex::new(text_model),
            dimension,
            model_name,
            batch_size: batch_size.max(1),
        })
    }

    /// Load the model described by the embedding settings.
    pub fn from_config(config: &crate::config::EmbeddingConfig) -> Result<Self, VectorError> {
        let model = parse_embedding_model(&config.model)?;
        Self::new(
            model,
            config.cache_dir.clone(),
            config.show_download_progress,
            config.batch_size,
        )
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = texts.len(), "Generating embeddings");

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed with SHA-256 into one bucket
/// with a +/-1 sign, and the result is L2-normalized. Identical text always
/// maps to the identical vector, so a self-query has distance 0. Texts that
/// share words land close together, which is enough for tests and for
/// running the engine without a model download.
#[derive(Debug, Clone)]
pub struct HashEmbeddingGenerator {
    dimension: VectorDimension,
}

impl Default for HashEmbeddingGenerator {
    fn default() -> Self {
        Self::new(VectorDimension::dimension_384())
    }
}

impl HashEmbeddingGenerator {
    /// Name reported by [`EmbeddingGenerator::model_name`].
    pub const MODEL_NAME: &'static str = "hash";

    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut embedding = vec![0.0f32; dim];

        let lowered = text.to_lowercase();
        let mut tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let trimmed = lowered.trim();
        if tokens.is_empty() && !trimmed.is_empty() {
            tokens.push(trimmed);
        }

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }
        embedding
    }
}

impl EmbeddingGenerator for HashEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }
}

/// Build the embedder named by the settings.
///
/// `model = "hash"` selects [`HashEmbeddingGenerator`] at the default
/// dimension and needs no download; any other name is loaded with fastembed.
pub fn embedder_from_config(
    config: &crate::config::EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingGenerator>, VectorError> {
    if config.model.eq_ignore_ascii_case(HashEmbeddingGenerator::MODEL_NAME) {
        return Ok(Arc::new(HashEmbeddingGenerator::default()));
    }
    Ok(Arc::new(FastEmbedGenerator::from_config(config)?))
}

/// Parse a configured model name into a fastembed model.
///
/// Accepts the enum variant spelling (`AllMiniLML6V2`) and the
/// Hugging Face repository spelling (`sentence-transformers/all-MiniLM-L6-v2`).
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    let normalized = name
        .rsplit('/')
        .next()
        .unwrap_or(name)
        .to_lowercase()
        .replace(['-', '_', '.'], "");

    let model = match normalized.as_str() {
        "allminilml6v2" => EmbeddingModel::AllMiniLML6V2,
        "allminilml12v2" => EmbeddingModel::AllMiniLML12V2,
        "paraphrasemultilingualminilml12v2" | "paraphrasemlminilml12v2" => {
            EmbeddingModel::ParaphraseMLMiniLML12V2
        }
        "multilinguale5small" => EmbeddingModel::MultilingualE5Small,
        "multilinguale5base" => EmbeddingModel::MultilingualE5Base,
        "bgesmallenv15" => EmbeddingModel::BGESmallENV15,
        "bgebaseenv15" => EmbeddingModel::BGEBaseENV15,
        _ => {
            return Err(VectorError::EmbeddingFailed(format!(
                "Unknown embedding model '{name}'. Supported: AllMiniLML6V2, AllMiniLML12V2, ParaphraseMLMiniLML12V2, MultilingualE5Small, MultilingualE5Base, BGESmallENV15, BGEBaseENV15"
            )));
        }
    };
    Ok(model)
}

/// Canonical name of a fastembed model, as written to settings and stats.
#[must_use]
pub fn model_to_string(model: &EmbeddingModel) -> String {
    match model {
        EmbeddingModel::AllMiniLML6V2 => "AllMiniLML6V2",
        EmbeddingModel::AllMiniLML12V2 => "AllMiniLML12V2",
        EmbeddingModel::ParaphraseMLMiniLML12V2 => "ParaphraseMLMiniLML12V2",
        EmbeddingModel::MultilingualE5Small => "MultilingualE5Small",
        EmbeddingModel::MultilingualE5Base => "MultilingualE5Base",
        EmbeddingModel::BGESmallENV15 => "BGESmallENV15",
        EmbeddingModel::BGEBaseENV15 => "BGEBaseENV15",
        other => return format!("{other:?}"),
    }
    .to_string()
}
