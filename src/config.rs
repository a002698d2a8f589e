//! Configuration for timerag
//!
//! All settings are plain serde structs with sensible defaults, loadable from a
//! JSON file. The OpenAI API key may also come from the `OPENAI_API_KEY`
//! environment variable.

use crate::error::{RagError, Result};
use crate::storage::schema::VectorIndexParams;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vector store location and collection layout
    pub store: StoreConfig,
    /// Retrieval settings
    pub search: SearchConfig,
    /// Embedding provider settings
    pub embedding: EmbeddingConfig,
    /// Language model settings
    pub llm: LlmConfig,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite store file
    pub path: String,
    /// Collection queried by default
    pub collection: String,
    /// Collection description recorded in the schema
    pub description: String,
    /// Maximum text length (characters) per record
    pub max_text_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "rag_store.db".to_string(),
            collection: "documents".to_string(),
            description: "Document chunks with ingestion timestamps".to_string(),
            max_text_len: 4096,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results requested from the store
    pub num_results: usize,
    /// HNSW build and query parameters
    pub index: VectorIndexParams,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_results: 8,
            index: VectorIndexParams {
                max_connections: 16,
                ef_construction: 200,
                ef_search: 64,
            },
        }
    }
}

/// Which embedder implementation to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Local deterministic feature-hashing embedder
    Hashing,
    /// OpenAI-compatible embeddings endpoint
    OpenAi,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider
    pub provider: EmbeddingProvider,
    /// Model name for remote providers
    pub model_name: String,
    /// Vector dimension produced by the model
    pub dimension: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            model_name: "text-embedding-3-small".to_string(),
            dimension: 384,
            normalize: true,
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key; empty means "read from the environment"
    pub api_key: String,
    /// Optional base URL for OpenAI-compatible APIs (e.g. a local Ollama server)
    pub base_url: Option<String>,
    /// Chat model name
    pub model: String,
    /// Optional system prompt sent ahead of the user prompt
    pub system_prompt: Option<String>,
    /// Maximum completion tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            max_tokens: 1024,
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    /// Configured API key, falling back to the environment
    pub fn resolved_api_key(&self) -> String {
        if self.api_key.is_empty() {
            std::env::var(API_KEY_ENV).unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RagError::Config(format!(
                "Failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.store.path.trim().is_empty() {
            return Err(RagError::Config("store.path must not be empty".to_string()));
        }
        if self.store.collection.trim().is_empty() {
            return Err(RagError::Config(
                "store.collection must not be empty".to_string(),
            ));
        }
        if self.search.num_results == 0 {
            return Err(RagError::Config(
                "search.num_results must be greater than zero".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        self.search.index.validate()?;
        Ok(())
    }
}
