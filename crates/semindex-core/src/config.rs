//! Engine configuration.
//!
//! Loading a config file from a specific path and secret handling are out
//! of scope for this crate; what lives here is the typed `Config` value
//! the engine is constructed from. `serde(default = "...")` on every field
//! means a partial TOML document is a valid config: only the options a
//! caller cares about need to be present.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a `semindex-core` engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding oracle backend selection and parameters.
    pub embedding: EmbeddingConfig,
    /// File processing limits and chunking targets.
    pub processing: ProcessingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            embedding: EmbeddingConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

/// Which embedding backend to use and its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"transformers"` (local in-process) or `"ollama"` (HTTP service).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier, backend-specific.
    #[serde(default = "default_model")]
    pub model: String,
    /// Required output dimension `D`; must match the stored schema.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Whether to L2-normalize returned vectors before handing them
    /// upstream.
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    /// HTTP endpoint for the `"ollama"` backend.
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,
    /// Worker-pool size for the `"ollama"` backend.
    #[serde(default = "default_ollama_max_concurrent")]
    pub ollama_max_concurrent: usize,
    /// Texts packed per HTTP request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retry attempts before a batch fails.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_provider() -> String {
    "transformers".to_string()
}
fn default_model() -> String {
    "local-placeholder".to_string()
}
fn default_dimensions() -> usize {
    768
}
fn default_normalize() -> bool {
    true
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_max_concurrent() -> usize {
    50
}
fn default_batch_size() -> usize {
    20
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: default_provider(),
            model: default_model(),
            dimensions: default_dimensions(),
            normalize: default_normalize(),
            ollama_base_url: default_ollama_base_url(),
            ollama_max_concurrent: default_ollama_max_concurrent(),
            batch_size: default_batch_size(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// File-size, chunk-count, and chunking-target limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Files larger than this are skipped (`file_too_large`) unless
    /// force-listed. Default 10 MiB.
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    /// Chunk target size in estimated tokens. Default 500.
    #[serde(default = "default_token_target")]
    pub token_target: usize,
    /// Prose overlap in estimated tokens. Default 64.
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    /// Per-file chunk ceiling.
    #[serde(default = "default_max_chunks_per_file")]
    pub max_chunks_per_file: usize,
    /// Master switch for the size and chunk-count skip gates: the
    /// `max_file_size_bytes` check, the pre-flight chunk-count estimate,
    /// and the post-chunk cap. When `false`, every file is processed
    /// regardless of size or chunk count (force-listing becomes moot).
    #[serde(default = "default_skip_large_files")]
    pub skip_large_files: bool,
}

fn default_max_file_size_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_token_target() -> usize {
    500
}
fn default_overlap_tokens() -> usize {
    64
}
fn default_max_chunks_per_file() -> usize {
    200
}
fn default_skip_large_files() -> bool {
    true
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            max_file_size_bytes: default_max_file_size_bytes(),
            token_target: default_token_target(),
            overlap_tokens: default_overlap_tokens(),
            max_chunks_per_file: default_max_chunks_per_file(),
            skip_large_files: default_skip_large_files(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_option_table() {
        let config = Config::default();
        assert_eq!(config.embedding.provider, "transformers");
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.embedding.ollama_max_concurrent, 50);
        assert_eq!(config.embedding.batch_size, 20);
        assert_eq!(config.embedding.request_timeout_secs, 30);
        assert_eq!(config.embedding.max_retries, 3);
        assert_eq!(config.processing.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.processing.token_target, 500);
        assert_eq!(config.processing.overlap_tokens, 64);
        assert!(config.processing.skip_large_files);
    }

    #[test]
    fn partial_toml_document_fills_in_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [embedding]
            provider = "ollama"
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(parsed.embedding.provider, "ollama");
        assert_eq!(parsed.embedding.dimensions, 768);
        assert_eq!(parsed.processing.token_target, 500);
    }
}
