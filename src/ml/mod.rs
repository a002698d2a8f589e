//! Embedding and vector search
//!
//! The embedding collaborator (`text -> vector`) and the HNSW index used by
//! the vector store.

pub mod embedding;
pub mod search;

// Re-export main types and functions
pub use embedding::{Embedder, Embedding, HashingEmbedder, OpenAiEmbedder, embedder_from_config, mean_embedding};
pub use search::{ScoredSlot, VectorSearchIndex, inner_product};
