//! Storage layer for timerag
//!
//! Collection schemas and index configuration, SQLite persistence, the store
//! lock artifact, and the vector store that serves filtered similarity search.

pub mod database;
pub mod filter;
pub mod lock;
pub mod schema;
pub mod store;

// Re-export main types
pub use database::Database;
pub use filter::{FilterExpr, TimeFilter};
pub use lock::{clear_stale_lock, lock_path_for};
pub use schema::{
    CollectionSchema, IndexConfig, Record, VectorIndexParams, create_index_params, create_schema,
};
pub use store::{CollectionInfo, SearchResult, VectorStore};
