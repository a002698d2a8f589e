//! Embedding collaborators
//!
//! The retrieval core only needs `text -> vector` of a fixed dimension. Two
//! implementations are provided: a local feature-hashing embedder that needs
//! no model files or network, and a client for OpenAI-compatible embedding
//! endpoints.

use crate::config::{EmbeddingConfig, EmbeddingProvider, LlmConfig};
use crate::error::{RagError, Result};
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Maps text to a fixed-dimension vector.
///
/// Implementations must be deterministic for a given model version and always
/// return vectors of length [`Embedder::dimension`].
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;

    fn dimension(&self) -> usize;
}

/// Build the embedder selected by the configuration
pub fn embedder_from_config(config: &EmbeddingConfig, llm: &LlmConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(
            config.dimension,
            config.normalize,
        )?)),
        EmbeddingProvider::OpenAi => Ok(Arc::new(OpenAiEmbedder::new(
            &llm.resolved_api_key(),
            llm.base_url.as_deref(),
            &config.model_name,
            config.dimension,
        )?)),
    }
}

/// Signed feature hashing over lowercase word unigrams and bigrams.
///
/// Features are hashed with SeaHash, whose output is fixed across platforms
/// and compiler versions, so stored vectors stay comparable with new queries.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    normalize: bool,
}

impl HashingEmbedder {
    pub fn new(dimension: usize, normalize: bool) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidDimension(dimension));
        }
        Ok(Self {
            dimension,
            normalize,
        })
    }

    /// Synchronous embedding; the async trait method delegates here
    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut embedding = vec![0.0f32; self.dimension];

        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        for word in &words {
            self.add_feature(&mut embedding, word, 1.0);
        }
        for pair in words.windows(2) {
            self.add_feature(&mut embedding, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        if self.normalize {
            normalize(&mut embedding);
        }
        embedding
    }

    fn add_feature(&self, embedding: &mut [f32], feature: &str, weight: f32) {
        let hash = seahash::hash(feature.as_bytes());

        let idx = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        embedding[idx] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// L2-normalize in place; zero vectors are left unchanged
pub fn normalize(embedding: &mut [f32]) {
    let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in embedding.iter_mut() {
            *value /= norm;
        }
    }
}

/// Element-wise mean of several embeddings, e.g. to search with a blended query
pub fn mean_embedding(embeddings: &[Embedding]) -> Result<Embedding> {
    let first = embeddings
        .first()
        .ok_or_else(|| RagError::Embedding("Cannot average zero embeddings".to_string()))?;

    let mut mean = vec![0.0f32; first.len()];
    for embedding in embeddings {
        if embedding.len() != mean.len() {
            return Err(RagError::DimensionMismatch {
                expected: mean.len(),
                actual: embedding.len(),
            });
        }
        for (acc, value) in mean.iter_mut().zip(embedding) {
            *acc += value;
        }
    }

    let count = embeddings.len() as f32;
    for value in mean.iter_mut() {
        *value /= count;
    }
    Ok(mean)
}

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, base_url: Option<&str>, model: &str, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidDimension(dimension));
        }

        let config = if let Some(base_url) = base_url {
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(base_url)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        log::info!("Using embedding model {} (dimension {})", model, dimension);
        Ok(Self {
            client: Client::with_config(config),
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.as_str())
            .input(text)
            .build()
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| RagError::Embedding("No embedding in response".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
