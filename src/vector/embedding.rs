//! Embedding generation for product descriptions and search queries.
//!
//! The index treats the generator as a pure function from text to a
//! fixed-dimension vector. Two production implementations are provided:
//!
//! - [`FastEmbedGenerator`]: AllMiniLML6V2 sentence embeddings via fastembed.
//!   The model is downloaded to the configured cache directory on first use.
//! - [`HashingEmbedder`]: deterministic feature hashing over word unigrams and
//!   character trigrams. Needs no model download, which makes it the choice for
//!   offline use and benchmarks. Its similarity is lexical, not semantic.

use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};

use crate::vector::{VECTOR_DIMENSION_384, VectorDimension, VectorError};

/// Model name accepted by [`create_generator`] for the fastembed model.
pub const FASTEMBED_MODEL_NAME: &str = "AllMiniLML6V2";

/// Model name accepted by [`create_generator`] for the hashing embedder.
pub const HASHING_MODEL_NAME: &str = "hashing";

/// Trait for generating embeddings from text.
///
/// Implementations must be deterministic for a fixed model version and safe to
/// share between threads.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts, one per input, in input order.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Human readable model identifier, recorded in index metadata.
    fn model_name(&self) -> &str;

    /// Embed a single text.
    ///
    /// Blank input is rejected rather than embedded.
    fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        if text.trim().is_empty() {
            return Err(VectorError::EmbeddingFailed(
                "cannot embed empty text".to_string(),
            ));
        }
        self.generate_embeddings(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                VectorError::EmbeddingFailed("model returned no embedding".to_string())
            })
    }
}

/// FastEmbed implementation using the AllMiniLML6V2 model.
///
/// Produces 384-dimensional embeddings. The underlying session needs `&mut`
/// access, so it sits behind a mutex; embedding calls are serialized.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedGenerator {
    /// Create a new generator, caching model files under `cache_dir`.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new(cache_dir: impl Into<PathBuf>, show_progress: bool) -> Result<Self, VectorError> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                .with_cache_dir(cache_dir.into())
                .with_show_download_progress(show_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        Ok(Self {
            model: Mutex::new(model),
            dimension: VectorDimension::dimension_384(),
        })
    }
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model", &FASTEMBED_MODEL_NAME)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(texts.to_vec(), None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            if embedding.len() != VECTOR_DIMENSION_384 {
                return Err(VectorError::DimensionMismatch {
                    expected: VECTOR_DIMENSION_384,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        FASTEMBED_MODEL_NAME
    }
}

/// Weight of a whole-word feature relative to a character trigram.
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic feature-hashing embedder.
///
/// Each lowercase word and each character trigram of `^word$` is hashed into
/// one of `dimension` buckets with a hash-derived sign. Text without any
/// alphanumeric word is hashed as a single feature, so no input embeds to the
/// zero vector. Output is not normalized; the index builder normalizes every
/// vector it stores.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: VectorDimension,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn accumulate(&self, feature: &str, weight: f32, out: &mut [f32]) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension.get() as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        out[bucket] += sign * weight;
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension.get()];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.accumulate(word, WORD_WEIGHT, &mut vector);

            let padded: Vec<char> = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.accumulate(&trigram, TRIGRAM_WEIGHT, &mut vector);
            }
        }

        // Punctuation-only text has no word features; hash it whole.
        if vector.iter().all(|x| *x == 0.0) {
            self.accumulate(text.trim(), WORD_WEIGHT, &mut vector);
        }

        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(VectorDimension::dimension_384())
    }
}

impl EmbeddingGenerator for HashingEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }
}

/// Build the generator named by `model`.
///
/// `dimension` only applies to the hashing embedder; the fastembed model has a
/// fixed output size.
pub fn create_generator(
    model: &str,
    dimension: usize,
    cache_dir: impl Into<PathBuf>,
    show_progress: bool,
) -> Result<Box<dyn EmbeddingGenerator>, VectorError> {
    match model {
        HASHING_MODEL_NAME => Ok(Box::new(HashingEmbedder::new(VectorDimension::new(
            dimension,
        )?))),
        FASTEMBED_MODEL_NAME => Ok(Box::new(FastEmbedGenerator::new(cache_dir, show_progress)?)),
        other => Err(VectorError::EmbeddingFailed(format!(
            "Unknown embedding model '{other}'. Supported models: {FASTEMBED_MODEL_NAME}, {HASHING_MODEL_NAME}"
        ))),
    }
}

/// Mock embedding generator for testing.
///
/// Words are mapped onto fixed axes so tests can reason about the geometry:
/// colours get their own axis, and each product family shares one. Every
/// component starts from a small baseline so no text embeds to zero.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
}

#[cfg(test)]
impl Default for MockEmbeddingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    const AXES: &'static [(&'static [&'static str], usize)] = &[
        (&["red"], 0),
        (&["blue"], 1),
        (&["shoes", "sneakers", "boots"], 2),
        (&["car", "tires", "wheels"], 3),
        (&["headphones", "audio", "speaker"], 4),
        (&["book", "strategy", "novel"], 5),
    ];

    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: VectorDimension::new(8).expect("non-zero"),
        }
    }

    /// Create a generator with custom dimension for testing.
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        Ok(texts
            .iter()
            .map(|text| {
                let mut embedding = vec![0.1; dim];
                for word in text.to_lowercase().split_whitespace() {
                    for (words, axis) in Self::AXES {
                        if *axis < dim && words.contains(&word) {
                            embedding[*axis] += 1.0;
                        }
                    }
                }
                embedding
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
