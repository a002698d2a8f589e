//! Collection schema and index configuration
//!
//! A collection has a fixed field layout: a short string primary key, the
//! document text, the ingestion timestamp and the embedding vector. The
//! schema fixes the vector dimension and the text bound; the index
//! configuration says how each field is indexed.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};

/// Database schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Primary key field
pub const ID_FIELD: &str = "document_uid";
/// Text field
pub const TEXT_FIELD: &str = "text";
/// Ingestion timestamp field (unix seconds, UTC)
pub const TIME_FIELD: &str = "ingest_time";
/// Embedding field
pub const VECTOR_FIELD: &str = "vector";

/// Maximum primary key length in characters
pub const MAX_ID_LEN: usize = 8;

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key, unique within the collection
    pub id: String,
    /// Document text
    pub text: String,
    /// Ingestion time in seconds since the epoch
    pub ingest_time: i64,
    /// Embedding vector
    pub vector: Vec<f32>,
}

impl Record {
    pub fn new(id: impl Into<String>, text: impl Into<String>, ingest_time: i64, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ingest_time,
            vector,
        }
    }
}

/// Field data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    VarChar,
    Int64,
    FloatVector,
}

/// Description of one field of the record shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub data_type: DataType,
    pub is_primary: bool,
    /// Maximum length for string fields
    pub max_length: Option<usize>,
    /// Dimension for vector fields
    pub dim: Option<usize>,
    pub description: String,
}

/// Collection schema; immutable once the collection exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub description: String,
    pub dim: usize,
    pub max_text_len: usize,
}

/// Create the schema for a collection.
///
/// Pure construction: nothing touches a store until the schema is passed to
/// [`VectorStore::create_collection`](crate::storage::VectorStore::create_collection).
pub fn create_schema(description: &str, dim: usize, max_text_len: usize) -> Result<CollectionSchema> {
    if dim == 0 {
        return Err(RagError::InvalidDimension(dim));
    }
    if max_text_len == 0 {
        return Err(RagError::InvalidLength(max_text_len));
    }

    Ok(CollectionSchema {
        description: description.to_string(),
        dim,
        max_text_len,
    })
}

impl CollectionSchema {
    /// Full field layout of records in this collection
    pub fn fields(&self) -> Vec<FieldSchema> {
        vec![
            FieldSchema {
                name: ID_FIELD.to_string(),
                data_type: DataType::VarChar,
                is_primary: true,
                max_length: Some(MAX_ID_LEN),
                dim: None,
                description: "primary id".to_string(),
            },
            FieldSchema {
                name: TEXT_FIELD.to_string(),
                data_type: DataType::VarChar,
                is_primary: false,
                max_length: Some(self.max_text_len),
                dim: None,
                description: "text".to_string(),
            },
            FieldSchema {
                name: TIME_FIELD.to_string(),
                data_type: DataType::Int64,
                is_primary: false,
                max_length: None,
                dim: None,
                description: "UTC timestamp of ingestion".to_string(),
            },
            FieldSchema {
                name: VECTOR_FIELD.to_string(),
                data_type: DataType::FloatVector,
                is_primary: false,
                max_length: None,
                dim: Some(self.dim),
                description: "vector".to_string(),
            },
        ]
    }

    /// Check a record against the schema
    pub fn validate_record(&self, record: &Record) -> Result<()> {
        if record.vector.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                actual: record.vector.len(),
            });
        }

        let id_len = record.id.chars().count();
        if id_len == 0 || id_len > MAX_ID_LEN {
            return Err(RagError::InvalidRecord {
                id: record.id.clone(),
                reason: format!("id length {} outside 1..={}", id_len, MAX_ID_LEN),
            });
        }

        let text_len = record.text.chars().count();
        if text_len > self.max_text_len {
            return Err(RagError::InvalidRecord {
                id: record.id.clone(),
                reason: format!(
                    "text length {} exceeds maximum {}",
                    text_len, self.max_text_len
                ),
            });
        }

        if record.vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::InvalidRecord {
                id: record.id.clone(),
                reason: "vector contains non-finite values".to_string(),
            });
        }

        Ok(())
    }
}

/// Similarity metric for the vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    /// Inner product; larger means more similar
    InnerProduct,
}

/// HNSW build and query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndexParams {
    /// Maximum number of connections per layer
    pub max_connections: usize,
    /// Candidate list size while building
    pub ef_construction: usize,
    /// Candidate list size while searching
    pub ef_search: usize,
}

impl VectorIndexParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 || self.ef_construction == 0 || self.ef_search == 0 {
            return Err(RagError::InvalidIndexParams(format!(
                "max_connections, ef_construction and ef_search must be positive, got {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// How a single field is indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Exact-match index (existence checks, joins)
    Inverted,
    /// Ordered index supporting range predicates
    Sorted,
    /// Approximate nearest-neighbour graph
    Hnsw {
        metric: MetricType,
        params: VectorIndexParams,
    },
}

/// Index definition for one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIndex {
    pub field_name: String,
    pub kind: IndexKind,
}

/// Set of per-field index specs, built once from the schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub indexes: Vec<FieldIndex>,
}

impl IndexConfig {
    pub fn field(&self, name: &str) -> Option<&FieldIndex> {
        self.indexes.iter().find(|index| index.field_name == name)
    }

    /// HNSW parameters of the vector field, if indexed
    pub fn vector_params(&self) -> Option<VectorIndexParams> {
        self.field(VECTOR_FIELD).and_then(|index| match index.kind {
            IndexKind::Hnsw { params, .. } => Some(params),
            _ => None,
        })
    }

    pub fn has_sorted_time_index(&self) -> bool {
        matches!(self.field(TIME_FIELD), Some(FieldIndex { kind: IndexKind::Sorted, .. }))
    }

    pub fn has_inverted_id_index(&self) -> bool {
        matches!(self.field(ID_FIELD), Some(FieldIndex { kind: IndexKind::Inverted, .. }))
    }

    /// Check that the configuration is usable for a collection
    pub fn validate(&self) -> Result<()> {
        match self.vector_params() {
            Some(params) => params.validate(),
            None => Err(RagError::InvalidIndexParams(format!(
                "no HNSW index on field '{}'",
                VECTOR_FIELD
            ))),
        }
    }
}

/// Create the index parameters for a collection.
///
/// Vector index parameters must be supplied explicitly.
pub fn create_index_params(schema: &CollectionSchema, params: VectorIndexParams) -> Result<IndexConfig> {
    params.validate()?;

    log::debug!(
        "Index params for dim {}: inverted({}), sorted({}), hnsw({}) {:?}",
        schema.dim,
        ID_FIELD,
        TIME_FIELD,
        VECTOR_FIELD,
        params
    );

    Ok(IndexConfig {
        indexes: vec![
            FieldIndex {
                field_name: ID_FIELD.to_string(),
                kind: IndexKind::Inverted,
            },
            FieldIndex {
                field_name: TIME_FIELD.to_string(),
                kind: IndexKind::Sorted,
            },
            FieldIndex {
                field_name: VECTOR_FIELD.to_string(),
                kind: IndexKind::Hnsw {
                    metric: MetricType::InnerProduct,
                    params,
                },
            },
        ],
    })
}

/// SQL for creating the collections table
pub const CREATE_COLLECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    schema TEXT NOT NULL,
    index_config TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
"#;

/// SQL for creating the records table
pub const CREATE_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    document_uid TEXT NOT NULL,
    text TEXT NOT NULL,
    ingest_time INTEGER NOT NULL,
    vector BLOB NOT NULL,
    PRIMARY KEY (collection, document_uid),
    FOREIGN KEY (collection) REFERENCES collections (name) ON DELETE CASCADE
);
"#;

/// SQL for creating the metadata table
pub const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SQL for the range index on ingestion time
pub const CREATE_RECORDS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_records_ingest_time ON records(collection, ingest_time);
"#;
