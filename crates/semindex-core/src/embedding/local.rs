//! Local, in-process embedding backend (`embedding.provider = "transformers"`).
//!
//! The model itself is out of scope (spec.md §1 treats it as an oracle);
//! what's implemented here is a deterministic, SHA-256-seeded placeholder
//! vector generator standing in for whatever model is actually loaded, so
//! the rest of the pipeline (batching, dimension validation, normalization)
//! can be built and tested without a real model dependency.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{l2_normalize, validate_dimensions, EmbeddingOracle, ProgressCallback};
use crate::config::EmbeddingConfig;
use crate::error::IndexResult;

/// In-process embedding backend.
pub struct LocalEmbedder {
    config: EmbeddingConfig,
}

impl LocalEmbedder {
    /// Construct a local embedder from the given configuration.
    #[must_use]
    pub fn new(config: EmbeddingConfig) -> Self {
        LocalEmbedder { config }
    }

    fn embed_single(&self, text: &str) -> Vec<f32> {
        let mut vector = seeded_pseudo_vector(text, self.config.dimensions);
        if self.config.normalize {
            l2_normalize(&mut vector);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingOracle for LocalEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed_many(
        &self,
        texts: &[String],
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> IndexResult<Vec<Vec<f32>>> {
        let vectors: Vec<Vec<f32>> = texts.iter().map(|text| self.embed_single(text)).collect();
        validate_dimensions(&vectors, self.config.dimensions)?;
        if let Some(callback) = on_progress {
            callback(vectors.len(), vectors.len());
        }
        Ok(vectors)
    }

    async fn probe(&self) -> bool {
        true
    }
}

/// Deterministic pseudo-embedding: repeatedly re-hash `text` with a
/// counter suffix, turning each hash's bytes into floats in `[-1, 1]`
/// until `dimensions` values have been produced.
fn seeded_pseudo_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dimensions);
    let mut counter: u32 = 0;
    while out.len() < dimensions {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for byte in digest {
            if out.len() >= dimensions {
                break;
            }
            out.push((f32::from(byte) / 127.5) - 1.0);
        }
        counter += 1;
    }
    out
}
