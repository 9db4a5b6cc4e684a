//! Embedding oracle client (C5).
//!
//! Two backends are configurable behind one capability interface: an
//! in-process local model (`local`) or an HTTP service (`remote`,
//! Ollama-shaped). The model itself is treated as an oracle —
//! `embed(text) -> vector` — this module only owns batching, concurrency,
//! retry, timeout, and optional L2 normalization.

mod local;
mod remote;

pub use local::LocalEmbedder;
pub use remote::RemoteEmbedder;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{IndexError, IndexResult};

/// Advisory progress callback invoked at most once per completed batch.
/// Invocations are not ordered with output assembly.
pub type ProgressCallback<'a> = dyn Fn(usize, usize) + Send + Sync + 'a;

/// Capability interface common to both embedding backends.
#[async_trait]
pub trait EmbeddingOracle: Send + Sync {
    /// The fixed output dimension `D` this oracle produces.
    fn dimensions(&self) -> usize;

    /// Embed a single piece of text.
    async fn embed_one(&self, text: &str) -> IndexResult<Vec<f32>> {
        let mut batch = self.embed_many(&[text.to_string()], None).await?;
        batch
            .pop()
            .ok_or_else(|| IndexError::EmbeddingOracle { message: "empty batch result".to_string() })
    }

    /// Embed a batch of texts, preserving input order:
    /// `|output| == |input|` and `output[i]` is the embedding of
    /// `input[i]`.
    async fn embed_many(
        &self,
        texts: &[String],
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> IndexResult<Vec<Vec<f32>>>;

    /// Probe whether the backend is reachable/ready (e.g. the HTTP
    /// backend's model-list call).
    async fn probe(&self) -> bool;
}

/// Construct the configured backend.
///
/// # Errors
/// Returns a `Configuration` error if `config.provider` names neither
/// `"transformers"` nor `"ollama"`.
pub fn build_oracle(config: &EmbeddingConfig) -> IndexResult<Box<dyn EmbeddingOracle>> {
    match config.provider.as_str() {
        "transformers" => Ok(Box::new(LocalEmbedder::new(config.clone()))),
        "ollama" => RemoteEmbedder::new(config.clone()).map(|e| Box::new(e) as Box<dyn EmbeddingOracle>),
        other => Err(IndexError::Configuration {
            details: format!("unknown embedding.provider {other:?}; expected \"transformers\" or \"ollama\""),
        }),
    }
}

/// L2-normalize `vector` in place. A zero vector is left unchanged (its
/// norm is already 0, normalizing would divide by zero).
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Validate every vector in `vectors` has length exactly `dimensions`,
/// failing loudly (per spec §4.5) if not.
pub fn validate_dimensions(vectors: &[Vec<f32>], dimensions: usize) -> IndexResult<()> {
    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != dimensions {
            return Err(IndexError::EmbeddingOracle {
                message: format!(
                    "embedding {index} has dimension {}, expected {dimensions}",
                    vector.len()
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_length_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn validate_dimensions_rejects_mismatched_length() {
        let vectors = vec![vec![0.0; 3], vec![0.0; 4]];
        assert!(validate_dimensions(&vectors, 3).is_err());
    }

    #[test]
    fn validate_dimensions_accepts_matching_length() {
        let vectors = vec![vec![0.0; 3], vec![0.0; 3]];
        assert!(validate_dimensions(&vectors, 3).is_ok());
    }

    #[test]
    fn build_oracle_rejects_unknown_provider() {
        let mut config = EmbeddingConfig::default();
        config.provider = "openai".to_string();
        assert!(build_oracle(&config).is_err());
    }
}
