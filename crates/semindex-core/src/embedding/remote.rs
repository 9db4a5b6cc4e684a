//! HTTP embedding backend (`embedding.provider = "ollama"`).
//!
//! Packs texts into batches of `batch_size`, fans them out across a
//! semaphore-bounded worker pool, retries each batch with linear backoff
//! on failure, and fails the whole call if any batch exhausts its
//! retries — the orchestrator then abandons the current file (spec
//! §4.5/§4.8) rather than silently substituting a placeholder vector.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{l2_normalize, validate_dimensions, EmbeddingOracle, ProgressCallback};
use crate::config::EmbeddingConfig;
use crate::error::{IndexError, IndexResult};

/// HTTP embedding backend, Ollama-shaped.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl RemoteEmbedder {
    /// Build an HTTP client honoring the configured per-request timeout.
    ///
    /// # Errors
    /// Returns a `Configuration` error if the HTTP client cannot be built.
    pub fn new(config: EmbeddingConfig) -> IndexResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| IndexError::Configuration { details: e.to_string() })?;
        Ok(RemoteEmbedder { client, config })
    }

    async fn request_batch(&self, texts: &[String]) -> IndexResult<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.config.ollama_base_url.trim_end_matches('/'));
        let request = EmbedRequest { model: &self.config.model, input: texts };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<EmbedResponse>()
            .await?;

        if response.embeddings.len() != texts.len() {
            return Err(IndexError::EmbeddingOracle {
                message: format!(
                    "embedding response had {} vectors for {} inputs",
                    response.embeddings.len(),
                    texts.len()
                ),
            });
        }
        Ok(response.embeddings)
    }

    async fn request_batch_with_retry(&self, texts: Vec<String>) -> IndexResult<Vec<Vec<f32>>> {
        let mut last_error = None;
        for attempt in 1..=self.config.max_retries {
            match self.request_batch(&texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                    }
                }
            }
        }
        Err(IndexError::EmbeddingOracle {
            message: format!(
                "batch of {} texts failed after {} attempts: {}",
                texts.len(),
                self.config.max_retries,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
        })
    }
}

#[async_trait]
impl EmbeddingOracle for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed_many(
        &self,
        texts: &[String],
        on_progress: Option<&ProgressCallback<'_>>,
    ) -> IndexResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<(usize, Vec<String>)> = texts
            .chunks(self.config.batch_size.max(1))
            .scan(0usize, |offset, chunk| {
                let start = *offset;
                *offset += chunk.len();
                Some((start, chunk.to_vec()))
            })
            .collect();

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.ollama_max_concurrent.max(1)));
        let completed = Arc::new(AtomicUsize::new(0));
        let total = texts.len();

        let mut handles = Vec::with_capacity(batches.len());
        for (start, batch_texts) in batches {
            let permit_pool = Arc::clone(&semaphore);
            let batch_len = batch_texts.len();
            let this_client = self.client.clone();
            let this_config = self.config.clone();
            let completed = Arc::clone(&completed);
            handles.push(tokio::spawn(async move {
                let _permit = permit_pool.acquire_owned().await.ok();
                let embedder = RemoteEmbedder { client: this_client, config: this_config };
                let result = embedder.request_batch_with_retry(batch_texts).await;
                completed.fetch_add(batch_len, Ordering::SeqCst);
                (start, result)
            }));
        }

        let mut slots: Vec<Option<Vec<f32>>> = vec![None; total];
        let mut first_error = None;
        for handle in handles {
            let (start, result) = handle
                .await
                .map_err(|e| IndexError::Internal(format!("embedding task panicked: {e}")))?;
            match result {
                Ok(vectors) => {
                    for (offset, vector) in vectors.into_iter().enumerate() {
                        slots[start + offset] = Some(vector);
                    }
                    if let Some(callback) = on_progress {
                        callback(completed.load(Ordering::SeqCst), total);
                    }
                }
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        let mut vectors = Vec::with_capacity(total);
        for (index, slot) in slots.into_iter().enumerate() {
            let mut vector = slot.ok_or_else(|| {
                IndexError::EmbeddingOracle { message: format!("missing embedding for input {index}") }
            })?;
            if self.config.normalize {
                l2_normalize(&mut vector);
            }
            vectors.push(vector);
        }
        validate_dimensions(&vectors, self.config.dimensions)?;
        Ok(vectors)
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.config.ollama_base_url.trim_end_matches('/'));
        let Ok(response) = self.client.get(&url).send().await else {
            return false;
        };
        let Ok(tags) = response.json::<TagsResponse>().await else {
            return false;
        };
        let wanted = self.config.model.as_str();
        tags.models
            .iter()
            .any(|entry| entry.name == wanted || entry.name == format!("{wanted}:latest"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 4,
            ollama_base_url: "http://127.0.0.1:1".to_string(),
            ollama_max_concurrent: 2,
            batch_size: 2,
            max_retries: 1,
            request_timeout_secs: 1,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn new_builds_client_successfully() {
        assert!(RemoteEmbedder::new(config()).is_ok());
    }

    #[tokio::test]
    async fn embed_many_on_unreachable_host_fails_the_whole_batch() {
        let embedder = RemoteEmbedder::new(config()).unwrap();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = embedder.embed_many(&texts, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn embed_many_on_empty_input_returns_empty_output() {
        let embedder = RemoteEmbedder::new(config()).unwrap();
        let result = embedder.embed_many(&[], None).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn probe_on_unreachable_host_returns_false() {
        let embedder = RemoteEmbedder::new(config()).unwrap();
        assert!(!embedder.probe().await);
    }
}
