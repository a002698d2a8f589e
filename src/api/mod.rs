//! API layer for timerag
//!
//! Retrieval over a vector store, the language-model and prompt collaborators,
//! and the RAG pipeline that ties them together.

pub mod chat;
pub mod rag;
pub mod retriever;

// Re-export main API types
pub use chat::{ContextPromptBuilder, LanguageModel, OpenAiChat, PromptBuilder};
pub use rag::{
    Answer, INSUFFICIENT_INFORMATION, RagPipeline, extract_structured, extract_structured_as,
};
pub use retriever::{
    DEFAULT_NUM_RESULTS, QueryContent, RagQuery, Retrieve, RetrievedContext, Retriever,
};
