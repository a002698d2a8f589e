//! # timerag
//!
//! A retrieval-augmented-generation core: vector similarity search with
//! ingestion-time filtering over a local SQLite-backed store, and a pipeline
//! that grounds a language model's answer in the retrieved documents.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use timerag::{
//!     ContextPromptBuilder, HashingEmbedder, OpenAiChat, RagPipeline, RagQuery, Record,
//!     Retriever, TimeFilter, VectorIndexParams, VectorStore, config::LlmConfig,
//!     create_index_params, create_schema,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(VectorStore::open("rag_store.db")?);
//!     let embedder = Arc::new(HashingEmbedder::new(384, true)?);
//!
//!     let schema = create_schema("news", 384, 4096)?;
//!     let params = VectorIndexParams { max_connections: 16, ef_construction: 200, ef_search: 64 };
//!     store.create_collection("news", schema.clone(), create_index_params(&schema, params)?)?;
//!
//!     let text = "The rover landed on Mars";
//!     store.insert("news", vec![Record::new("n1", text, 1_700_000_000, embedder.embed_sync(text))])?;
//!
//!     let retriever = Retriever::new(store.clone(), embedder, "news")?;
//!     let rag = RagPipeline::new(
//!         Arc::new(retriever),
//!         Arc::new(ContextPromptBuilder::default()),
//!         Arc::new(OpenAiChat::new(&LlmConfig::default())),
//!     );
//!
//!     let query = RagQuery::new("Where did the rover land?")
//!         .with_time_filter(TimeFilter::since(1_690_000_000));
//!     println!("{}", rag.answer_or_decline(&query).await?);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod ml;
pub mod storage;
pub mod utils;

// Re-export main API types
pub use api::{
    Answer, ContextPromptBuilder, LanguageModel, OpenAiChat, PromptBuilder, QueryContent,
    RagPipeline, RagQuery, Retrieve, RetrievedContext, Retriever, extract_structured,
    extract_structured_as,
};
pub use config::Config;
pub use error::{RagError, Result};

// Re-export commonly used types
pub use ml::{Embedder, Embedding, HashingEmbedder, OpenAiEmbedder};
pub use storage::{
    CollectionSchema, IndexConfig, Record, SearchResult, TimeFilter, VectorIndexParams,
    VectorStore, create_index_params, create_schema,
};
