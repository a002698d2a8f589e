//! SQLite persistence for collections and records
//!
//! Collections keep their schema and index configuration as JSON; records keep
//! their vectors as little-endian `f32` blobs.

use crate::error::{RagError, Result};
use crate::storage::schema::*;
use rusqlite::{Connection, Row, params};
use std::path::Path;

/// Persisted collection definition
#[derive(Debug, Clone)]
pub struct StoredCollection {
    pub name: String,
    pub schema: CollectionSchema,
    pub index_config: IndexConfig,
    pub created_at: i64,
}

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database connection
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to open database: {}", e)))?;

        let mut db = Self { conn };
        db.initialize(true)?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            RagError::StoreUnavailable(format!("Failed to create in-memory database: {}", e))
        })?;

        let mut db = Self { conn };
        db.initialize(false)?;
        Ok(db)
    }

    /// Initialize database schema
    fn initialize(&mut self, wal: bool) -> Result<()> {
        if wal {
            let _: String = self
                .conn
                .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
                .map_err(|e| storage_err("Failed to enable WAL mode", e))?;
        }

        self.conn
            .execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| storage_err("Failed to enable foreign keys", e))?;

        self.conn
            .execute(CREATE_COLLECTIONS_TABLE, [])
            .map_err(|e| storage_err("Failed to create collections table", e))?;

        self.conn
            .execute(CREATE_RECORDS_TABLE, [])
            .map_err(|e| storage_err("Failed to create records table", e))?;

        self.conn
            .execute(CREATE_METADATA_TABLE, [])
            .map_err(|e| storage_err("Failed to create metadata table", e))?;

        self.conn
            .execute_batch(CREATE_RECORDS_INDEXES)
            .map_err(|e| storage_err("Failed to create indexes", e))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)",
                params![SCHEMA_VERSION.to_string()],
            )
            .map_err(|e| storage_err("Failed to set schema version", e))?;

        log::info!("Database initialized with schema version {}", SCHEMA_VERSION);
        Ok(())
    }

    /// Persist a new collection definition
    pub fn insert_collection(&self, collection: &StoredCollection) -> Result<()> {
        let schema = serde_json::to_string(&collection.schema)?;
        let index_config = serde_json::to_string(&collection.index_config)?;

        self.conn
            .execute(
                "INSERT INTO collections (name, schema, index_config, created_at) VALUES (?, ?, ?, ?)",
                params![collection.name, schema, index_config, collection.created_at],
            )
            .map_err(|e| storage_err(&format!("Failed to insert collection {}", collection.name), e))?;
        Ok(())
    }

    /// Delete a collection and its records
    pub fn delete_collection(&mut self, name: &str) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| storage_err("Failed to start transaction", e))?;

        tx.execute("DELETE FROM records WHERE collection = ?", params![name])
            .map_err(|e| storage_err(&format!("Failed to delete records of {}", name), e))?;
        tx.execute("DELETE FROM collections WHERE name = ?", params![name])
            .map_err(|e| storage_err(&format!("Failed to delete collection {}", name), e))?;

        tx.commit()
            .map_err(|e| storage_err("Failed to commit transaction", e))?;
        Ok(())
    }

    /// Load every collection definition
    pub fn load_collections(&self) -> Result<Vec<StoredCollection>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, schema, index_config, created_at FROM collections ORDER BY name")
            .map_err(|e| storage_err("Failed to prepare query", e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(|e| storage_err("Failed to query collections", e))?;

        let mut result = Vec::new();
        for row in rows {
            let (name, schema, index_config, created_at) =
                row.map_err(|e| storage_err("Failed to process collection row", e))?;
            result.push(StoredCollection {
                name,
                schema: serde_json::from_str(&schema)?,
                index_config: serde_json::from_str(&index_config)?,
                created_at,
            });
        }

        Ok(result)
    }

    /// Insert multiple records in a transaction
    pub fn insert_records(&mut self, collection: &str, records: &[Record]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| storage_err("Failed to start transaction", e))?;

        {
            let mut stmt = tx
                .prepare(
                    r#"
                INSERT INTO records (collection, document_uid, text, ingest_time, vector)
                VALUES (?, ?, ?, ?, ?)
                "#,
                )
                .map_err(|e| storage_err("Failed to prepare statement", e))?;

            for record in records {
                stmt.execute(params![
                    collection,
                    record.id,
                    record.text,
                    record.ingest_time,
                    vector_to_blob(&record.vector),
                ])
                .map_err(|e| storage_err(&format!("Failed to insert record {}", record.id), e))?;
            }
        }

        tx.commit()
            .map_err(|e| storage_err("Failed to commit transaction", e))?;

        log::info!("Inserted {} records into {}", records.len(), collection);
        Ok(())
    }

    /// Load all records of a collection, in insertion order
    pub fn load_records(&self, collection: &str) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT document_uid, text, ingest_time, vector FROM records WHERE collection = ? ORDER BY rowid",
            )
            .map_err(|e| storage_err("Failed to prepare query", e))?;

        let records = stmt
            .query_map(params![collection], row_to_record)
            .map_err(|e| storage_err(&format!("Failed to query records of {}", collection), e))?;

        let mut result = Vec::new();
        for record in records {
            result.push(record.map_err(|e| storage_err("Failed to process record row", e))?);
        }

        Ok(result)
    }

    /// Count records whose ingestion time lies in `[low, high]`
    pub fn count_in_time_range(&self, collection: &str, low: i64, high: i64) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE collection = ? AND ingest_time BETWEEN ? AND ?",
                params![collection, low, high],
                |row| row.get(0),
            )
            .map_err(|e| storage_err("Failed to count records", e))?;

        Ok(count as usize)
    }

    /// Get database file size in bytes
    pub fn file_size(&self) -> Result<usize> {
        let size: i64 = self
            .conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .map_err(|e| storage_err("Failed to get database size", e))?;

        Ok(size as usize)
    }
}

fn storage_err(context: &str, e: rusqlite::Error) -> RagError {
    RagError::StoreUnavailable(format!("{}: {}", context, e))
}

fn row_to_record(row: &Row) -> rusqlite::Result<Record> {
    let blob: Vec<u8> = row.get(3)?;
    Ok(Record {
        id: row.get(0)?,
        text: row.get(1)?,
        ingest_time: row.get(2)?,
        vector: blob_to_vector(&blob),
    })
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &val in vector {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
