//! Retriever - query resolution and search
//!
//! A query is either text, embedded on the fly, or a precomputed vector used
//! as-is (for example the mean of several embeddings). An empty result is the
//! distinct [`RagError::NoRelevantDataFound`] outcome, never an empty success.

use crate::error::{RagError, Result};
use crate::ml::{Embedder, Embedding};
use crate::storage::{SearchResult, TimeFilter, VectorStore};
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;

/// Default number of results requested per query
pub const DEFAULT_NUM_RESULTS: usize = 8;

/// What to search with
#[derive(Debug, Clone, Copy)]
pub enum QueryContent<'a> {
    /// Embedded before searching
    Text(&'a str),
    /// Used unchanged
    Vector(&'a [f32]),
}

/// A question for the RAG pipeline
#[derive(Debug, Clone)]
pub struct RagQuery {
    /// Question text, used for the prompt and, without a vector, for the search
    pub question: String,
    /// Precomputed search vector overriding the question's embedding
    pub vector: Option<Embedding>,
    /// Number of results requested from the store
    pub num_results: usize,
    /// Ingestion time bounds
    pub time_filter: TimeFilter,
}

impl RagQuery {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            vector: None,
            num_results: DEFAULT_NUM_RESULTS,
            time_filter: TimeFilter::none(),
        }
    }

    pub fn with_vector(mut self, vector: Embedding) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_num_results(mut self, num_results: usize) -> Self {
        self.num_results = num_results;
        self
    }

    pub fn with_time_filter(mut self, time_filter: TimeFilter) -> Self {
        self.time_filter = time_filter;
        self
    }

    /// Search input: the vector if one was given, otherwise the question
    pub fn content(&self) -> QueryContent<'_> {
        match &self.vector {
            Some(vector) => QueryContent::Vector(vector),
            None => QueryContent::Text(&self.question),
        }
    }
}

/// Non-empty, ranked search results
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext(Vec<SearchResult>);

impl RetrievedContext {
    /// `None` if `results` is empty
    pub fn new(results: Vec<SearchResult>) -> Option<Self> {
        if results.is_empty() {
            None
        } else {
            Some(Self(results))
        }
    }

    /// Most similar result
    pub fn best(&self) -> &SearchResult {
        &self.0[0]
    }

    pub fn into_inner(self) -> Vec<SearchResult> {
        self.0
    }
}

impl Deref for RetrievedContext {
    type Target = [SearchResult];

    fn deref(&self) -> &[SearchResult] {
        &self.0
    }
}

/// Retrieval step of the pipeline
#[async_trait]
pub trait Retrieve: Send + Sync {
    async fn retrieve(
        &self,
        content: QueryContent<'_>,
        num_results: usize,
        time_filter: &TimeFilter,
    ) -> Result<RetrievedContext>;
}

/// Retriever over one collection of a [`VectorStore`]
pub struct Retriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
}

impl Retriever {
    /// Create a retriever; the embedder must match the collection dimension
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>, collection: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        let info = store.collection_info(&collection)?;
        if info.schema.dim != embedder.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: info.schema.dim,
                actual: embedder.dimension(),
            });
        }

        log::info!("Retriever initialized for collection '{}'", collection);
        Ok(Self {
            store,
            embedder,
            collection,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Search vector for the query content
    pub async fn resolve_vector(&self, content: QueryContent<'_>) -> Result<Embedding> {
        match content {
            QueryContent::Text(text) => self.embedder.embed(text).await,
            QueryContent::Vector(vector) => Ok(vector.to_vec()),
        }
    }

    /// Raw search; may return an empty list
    pub async fn search(
        &self,
        content: QueryContent<'_>,
        num_results: usize,
        time_filter: &TimeFilter,
    ) -> Result<Vec<SearchResult>> {
        let vector = self.resolve_vector(content).await?;
        self.store
            .search(&self.collection, &vector, num_results, time_filter)
    }
}

#[async_trait]
impl Retrieve for Retriever {
    async fn retrieve(
        &self,
        content: QueryContent<'_>,
        num_results: usize,
        time_filter: &TimeFilter,
    ) -> Result<RetrievedContext> {
        let results = self.search(content, num_results, time_filter).await?;
        match RetrievedContext::new(results) {
            Some(context) => {
                log::debug!(
                    "Retrieved {} results from '{}'",
                    context.len(),
                    self.collection
                );
                Ok(context)
            }
            None => {
                log::info!("No relevant results in '{}' for query", self.collection);
                Err(RagError::NoRelevantDataFound)
            }
        }
    }
}
