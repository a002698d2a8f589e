//! Vector store: collections, ingestion and filtered similarity search
//!
//! A [`VectorStore`] owns the SQLite file and, for each collection, the
//! in-memory indexes described by its [`IndexConfig`]: an exact-match map on
//! the primary key, an ordered map on the ingestion time and an HNSW graph on
//! the vectors. Indexes are rebuilt from the database when the store opens.
//!
//! Searches take a shared lock and can run concurrently. Ingestion and
//! collection changes take the exclusive lock. An insert only invalidates the
//! HNSW graph; the first search afterwards rebuilds it from all vectors, so
//! ingesting in batches keeps rebuilds rare.

use crate::error::{RagError, Result};
use crate::ml::search::{ScoredSlot, VectorSearchIndex};
use crate::storage::database::{Database, StoredCollection};
use crate::storage::filter::{FilterExpr, TimeFilter};
use crate::storage::lock::{StoreLock, clear_stale_lock};
use crate::storage::schema::{CollectionSchema, IndexConfig, Record};
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Store paths currently open in this process
static OPEN_STORES: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// A ranked match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    /// Inner product with the query; larger is more similar
    pub score: f32,
}

/// Summary of one collection
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub schema: CollectionSchema,
    pub index_config: IndexConfig,
    pub record_count: usize,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
struct RecordEntry {
    id: String,
    text: String,
    ingest_time: i64,
}

struct CollectionState {
    schema: CollectionSchema,
    index_config: IndexConfig,
    created_at: i64,
    entries: Vec<RecordEntry>,
    id_index: HashMap<String, usize>,
    time_index: BTreeMap<i64, Vec<usize>>,
    vectors: VectorSearchIndex,
}

impl CollectionState {
    fn new(schema: CollectionSchema, index_config: IndexConfig, created_at: i64) -> Result<Self> {
        let params = index_config.vector_params().ok_or_else(|| {
            RagError::InvalidIndexParams("collection has no vector index".to_string())
        })?;
        let vectors = VectorSearchIndex::new(schema.dim, params)?;

        Ok(Self {
            schema,
            index_config,
            created_at,
            entries: Vec::new(),
            id_index: HashMap::new(),
            time_index: BTreeMap::new(),
            vectors,
        })
    }

    fn slot_of(&self, id: &str) -> Option<usize> {
        if self.index_config.has_inverted_id_index() {
            self.id_index.get(id).copied()
        } else {
            self.entries.iter().position(|entry| entry.id == id)
        }
    }

    /// Append records that already passed validation; the caller rebuilds the graph
    fn append(&mut self, records: Vec<Record>) -> Result<()> {
        for record in records {
            let slot = self.vectors.add_vector(record.vector)?;
            if self.index_config.has_inverted_id_index() {
                self.id_index.insert(record.id.clone(), slot);
            }
            if self.index_config.has_sorted_time_index() {
                self.time_index.entry(record.ingest_time).or_default().push(slot);
            }
            self.entries.push(RecordEntry {
                id: record.id,
                text: record.text,
                ingest_time: record.ingest_time,
            });
        }
        Ok(())
    }

    /// Slots admitted by the filter, via the range index when there is one
    fn filtered_slots(&self, filter: Option<&FilterExpr>) -> Vec<usize> {
        match filter {
            None => (0..self.entries.len()).collect(),
            Some(expr) if self.index_config.has_sorted_time_index() => {
                let (low, high) = expr.bounds();
                if low > high {
                    return Vec::new();
                }
                let mut slots: Vec<usize> = self
                    .time_index
                    .range(low..=high)
                    .flat_map(|(_, slots)| slots.iter().copied())
                    .collect();
                slots.sort_unstable();
                slots
            }
            Some(expr) => (0..self.entries.len())
                .filter(|&slot| expr.matches(self.entries[slot].ingest_time))
                .collect(),
        }
    }

    fn record_at(&self, slot: usize) -> Option<Record> {
        let entry = self.entries.get(slot)?;
        let vector = self.vectors.get_vector(slot)?;
        Some(Record {
            id: entry.id.clone(),
            text: entry.text.clone(),
            ingest_time: entry.ingest_time,
            vector: vector.clone(),
        })
    }
}

/// Removes the path from the open-store registry when the store is dropped
#[derive(Debug)]
struct Registration(PathBuf);

impl Drop for Registration {
    fn drop(&mut self) {
        OPEN_STORES.lock().remove(&self.0);
    }
}

/// Handle to an open store
pub struct VectorStore {
    path: Option<PathBuf>,
    db: Mutex<Database>,
    collections: RwLock<HashMap<String, CollectionState>>,
    // Released after the database connection closes.
    _lock: Option<StoreLock>,
    _registration: Option<Registration>,
}

impl VectorStore {
    /// Open or create the store at `path`.
    ///
    /// A lock artifact left next to the file by a process that exited without
    /// closing the store is removed first. This assumes no other live process
    /// is using the store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = std::path::absolute(path.as_ref()).map_err(|e| {
            RagError::StoreUnavailable(format!(
                "Failed to resolve store path {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let mut open_stores = OPEN_STORES.lock();
        if open_stores.contains(&path) {
            return Err(RagError::StoreUnavailable(format!(
                "Store already open in this process: {}",
                path.display()
            )));
        }

        if let Some(dir) = path.parent() {
            if !dir.is_dir() {
                return Err(RagError::StoreUnavailable(format!(
                    "Store directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        clear_stale_lock(&path)?;
        let lock = StoreLock::acquire(&path)?;
        let db = Database::new(&path)?;
        let collections = Self::load_collections(&db)?;

        log::info!(
            "Opened vector store {} with {} collection(s)",
            path.display(),
            collections.len()
        );

        open_stores.insert(path.clone());
        Ok(Self {
            path: Some(path.clone()),
            db: Mutex::new(db),
            collections: RwLock::new(collections),
            _lock: Some(lock),
            _registration: Some(Registration(path)),
        })
    }

    /// Ephemeral store with no file and no lock
    pub fn in_memory() -> Result<Self> {
        let db = Database::memory()?;
        Ok(Self {
            path: None,
            db: Mutex::new(db),
            collections: RwLock::new(HashMap::new()),
            _lock: None,
            _registration: None,
        })
    }

    fn load_collections(db: &Database) -> Result<HashMap<String, CollectionState>> {
        let mut collections = HashMap::new();
        for stored in db.load_collections()? {
            let mut state =
                CollectionState::new(stored.schema, stored.index_config, stored.created_at)?;
            let records = db.load_records(&stored.name)?;
            let count = records.len();
            state.append(records)?;
            state.vectors.build()?;

            log::info!("Loaded collection '{}' with {} records", stored.name, count);
            collections.insert(stored.name, state);
        }
        Ok(collections)
    }

    /// Store file path; `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create a collection from a schema and index configuration.
    ///
    /// Re-creating an existing collection with the same definition is a no-op.
    pub fn create_collection(&self, name: &str, schema: CollectionSchema, index_config: IndexConfig) -> Result<()> {
        if name.trim().is_empty() {
            return Err(RagError::InvalidQuery(
                "collection name must not be empty".to_string(),
            ));
        }
        index_config.validate()?;

        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            if existing.schema == schema && existing.index_config == index_config {
                log::debug!("Collection '{}' already exists", name);
                return Ok(());
            }
            return Err(RagError::CollectionExists(name.to_string()));
        }

        let created_at = chrono::Utc::now().timestamp();
        let state = CollectionState::new(schema.clone(), index_config.clone(), created_at)?;
        self.db.lock().insert_collection(&StoredCollection {
            name: name.to_string(),
            schema,
            index_config,
            created_at,
        })?;

        collections.insert(name.to_string(), state);
        log::info!("Created collection '{}'", name);
        Ok(())
    }

    /// Drop a collection and all its records
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if !collections.contains_key(name) {
            return Err(RagError::CollectionNotFound(name.to_string()));
        }

        self.db.lock().delete_collection(name)?;
        collections.remove(name);
        log::info!("Dropped collection '{}'", name);
        Ok(())
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Collection names, sorted
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let collections = self.collections.read();
        let state = collections
            .get(name)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        Ok(CollectionInfo {
            name: name.to_string(),
            schema: state.schema.clone(),
            index_config: state.index_config.clone(),
            record_count: state.entries.len(),
            created_at: state.created_at,
        })
    }

    /// Validate and insert records; returns the number inserted.
    ///
    /// The batch is all-or-nothing: any invalid or duplicate record rejects it.
    /// The vector graph is rebuilt lazily by the next search.
    pub fn insert(&self, collection: &str, records: Vec<Record>) -> Result<usize> {
        let mut collections = self.collections.write();
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        let mut batch_ids = HashSet::new();
        for record in &records {
            state.schema.validate_record(record)?;
            if state.slot_of(&record.id).is_some() || !batch_ids.insert(record.id.as_str()) {
                return Err(RagError::DuplicateRecord {
                    collection: collection.to_string(),
                    id: record.id.clone(),
                });
            }
        }

        if records.is_empty() {
            return Ok(0);
        }

        self.db.lock().insert_records(collection, &records)?;

        let count = records.len();
        state.append(records)?;
        Ok(count)
    }

    /// Exact lookup by primary key
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        let collections = self.collections.read();
        let state = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        Ok(state.slot_of(id).and_then(|slot| state.record_at(slot)))
    }

    /// Number of records in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.collection_info(collection)?.record_count)
    }

    /// Number of persisted records inside a time window
    pub fn count_in_window(&self, collection: &str, time_filter: &TimeFilter) -> Result<usize> {
        if !self.has_collection(collection) {
            return Err(RagError::CollectionNotFound(collection.to_string()));
        }
        let (low, high) = time_filter
            .to_expression()
            .map(|expr| expr.bounds())
            .unwrap_or((i64::MIN, i64::MAX));
        if low > high {
            return Ok(0);
        }
        self.db.lock().count_in_time_range(collection, low, high)
    }

    /// Similarity search restricted by an optional time window.
    ///
    /// Returns at most `limit` matches, most similar first. Stored records
    /// whose vector equals `query_vector` are left out, so a query vector
    /// taken from the store does not find its own document.
    pub fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        time_filter: &TimeFilter,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Err(RagError::InvalidQuery(
                "limit must be greater than zero".to_string(),
            ));
        }

        self.ensure_graph(collection)?;

        let collections = self.collections.read();
        let state = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        if query_vector.len() != state.schema.dim {
            return Err(RagError::DimensionMismatch {
                expected: state.schema.dim,
                actual: query_vector.len(),
            });
        }

        let filter = time_filter.to_expression();
        if let Some(expr) = &filter {
            log::debug!("Searching '{}' with filter '{}'", collection, expr);
        }

        let admit = |slot: usize| {
            filter
                .as_ref()
                .is_none_or(|expr| expr.matches(state.entries[slot].ingest_time))
        };

        let ranked: Vec<ScoredSlot> =
            match state.vectors.search_approximate(query_vector, limit, admit)? {
                Some(hits) if hits.len() >= limit => hits,
                _ => {
                    log::debug!("Exact scan for '{}' (limit {})", collection, limit);
                    let candidates = state.filtered_slots(filter.as_ref());
                    state.vectors.search_exact(query_vector, limit, candidates)?
                }
            };

        let results: Vec<SearchResult> = ranked
            .into_iter()
            .filter_map(|hit| {
                let vector = state.vectors.get_vector(hit.slot)?;
                if vector.as_slice() == query_vector {
                    return None;
                }
                let entry = &state.entries[hit.slot];
                Some(SearchResult {
                    id: entry.id.clone(),
                    text: entry.text.clone(),
                    vector: vector.clone(),
                    score: hit.score,
                })
            })
            .collect();

        log::debug!("Search in '{}' returned {} results", collection, results.len());
        Ok(results)
    }

    /// Build the collection's HNSW graph if an insert invalidated it
    fn ensure_graph(&self, collection: &str) -> Result<()> {
        let stale = |state: &CollectionState| !state.vectors.is_built() && !state.vectors.is_empty();

        if !self.collections.read().get(collection).is_some_and(stale) {
            return Ok(());
        }

        let collections = self.collections.upgradable_read();
        if !collections.get(collection).is_some_and(stale) {
            return Ok(());
        }

        let mut collections = RwLockUpgradableReadGuard::upgrade(collections);
        if let Some(state) = collections.get_mut(collection) {
            state.vectors.build()?;
        }
        Ok(())
    }

    /// Store file size in bytes
    pub fn file_size(&self) -> Result<usize> {
        self.db.lock().file_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::lock::lock_path_for;
    use crate::storage::schema::{VectorIndexParams, create_index_params, create_schema};
    use tempfile::tempdir;

    fn params() -> VectorIndexParams {
        VectorIndexParams {
            max_connections: 16,
            ef_construction: 100,
            ef_search: 32,
        }
    }

    fn setup(store: &VectorStore, dim: usize) {
        let schema = create_schema("test", dim, 256).unwrap();
        let config = create_index_params(&schema, params()).unwrap();
        store.create_collection("docs", schema, config).unwrap();
    }

    fn cat_dog_store() -> VectorStore {
        let store = VectorStore::in_memory().unwrap();
        setup(&store, 3);
        store
            .insert(
                "docs",
                vec![
                    Record::new("a", "cat", 100, vec![1.0, 0.0, 0.0]),
                    Record::new("b", "dog", 200, vec![0.0, 1.0, 0.0]),
                ],
            )
            .unwrap();
        store
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_search_order() {
        let store = cat_dog_store();
        let results = store
            .search("docs", &[0.9, 0.1, 0.0], 2, &TimeFilter::none())
            .unwrap();
        assert_eq!(ids(&results), vec!["a", "b"]);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_graph_rebuilt_on_first_search_after_insert() {
        let store = cat_dog_store();
        let is_built = |store: &VectorStore| store.collections.read()["docs"].vectors.is_built();
        assert!(!is_built(&store));

        store
            .search("docs", &[0.9, 0.1, 0.0], 1, &TimeFilter::none())
            .unwrap();
        assert!(is_built(&store));

        for i in 0..5 {
            store
                .insert(
                    "docs",
                    vec![Record::new(format!("c{}", i), "cow", 300 + i, vec![0.5, 0.5, 0.1])],
                )
                .unwrap();
            assert!(!is_built(&store));
        }

        let results = store
            .search("docs", &[0.0, 0.0, 1.0], 7, &TimeFilter::since(300))
            .unwrap();
        assert_eq!(results.len(), 5);
        assert!(is_built(&store));
    }

    #[test]
    fn test_search_with_start_time() {
        let store = cat_dog_store();
        let results = store
            .search("docs", &[0.9, 0.1, 0.0], 2, &TimeFilter::since(150))
            .unwrap();
        assert_eq!(ids(&results), vec!["b"]);
    }

    #[test]
    fn test_self_match_suppressed() {
        let store = cat_dog_store();
        let results = store
            .search("docs", &[1.0, 0.0, 0.0], 2, &TimeFilter::none())
            .unwrap();
        assert_eq!(ids(&results), vec!["b"]);
    }

    #[test]
    fn test_empty_window() {
        let store = cat_dog_store();
        let results = store
            .search("docs", &[0.9, 0.1, 0.0], 2, &TimeFilter::between(300, 400))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_errors() {
        let store = cat_dog_store();
        assert!(matches!(
            store.search("nope", &[1.0, 0.0, 0.0], 1, &TimeFilter::none()),
            Err(RagError::CollectionNotFound(_))
        ));
        assert!(matches!(
            store.search("docs", &[1.0, 0.0], 1, &TimeFilter::none()),
            Err(RagError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            store.search("docs", &[1.0, 0.0, 0.0], 0, &TimeFilter::none()),
            Err(RagError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let store = cat_dog_store();
        assert!(matches!(
            store.insert("docs", vec![Record::new("a", "again", 1, vec![0.0, 0.0, 1.0])]),
            Err(RagError::DuplicateRecord { .. })
        ));
        assert!(matches!(
            store.insert(
                "docs",
                vec![
                    Record::new("c", "x", 1, vec![0.0, 0.0, 1.0]),
                    Record::new("c", "y", 1, vec![0.0, 0.0, 1.0]),
                ]
            ),
            Err(RagError::DuplicateRecord { .. })
        ));
        assert_eq!(store.count("docs").unwrap(), 2);
    }

    #[test]
    fn test_get_and_counts() {
        let store = cat_dog_store();
        let record = store.get("docs", "b").unwrap().unwrap();
        assert_eq!(record.text, "dog");
        assert_eq!(record.vector, vec![0.0, 1.0, 0.0]);
        assert!(store.get("docs", "zz").unwrap().is_none());

        assert_eq!(store.count_in_window("docs", &TimeFilter::until(150)).unwrap(), 1);
        assert_eq!(store.count_in_window("docs", &TimeFilter::none()).unwrap(), 2);
    }

    #[test]
    fn test_create_collection_conflict() {
        let store = cat_dog_store();
        let same = create_schema("test", 3, 256).unwrap();
        let config = create_index_params(&same, params()).unwrap();
        assert!(store.create_collection("docs", same, config.clone()).is_ok());

        let other = create_schema("test", 4, 256).unwrap();
        assert!(matches!(
            store.create_collection("docs", other, config),
            Err(RagError::CollectionExists(_))
        ));
    }

    #[test]
    fn test_drop_collection() {
        let store = cat_dog_store();
        store.drop_collection("docs").unwrap();
        assert!(!store.has_collection("docs"));
        assert!(matches!(
            store.drop_collection("docs"),
            Err(RagError::CollectionNotFound(_))
        ));
    }

    #[test]
    fn test_open_persists_and_releases_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let lock = lock_path_for(&path).unwrap();

        {
            let store = VectorStore::open(&path).unwrap();
            setup(&store, 2);
            store
                .insert("docs", vec![Record::new("x", "hello", 5, vec![0.6, 0.8])])
                .unwrap();
            assert!(lock.exists());
            assert!(matches!(
                VectorStore::open(&path),
                Err(RagError::StoreUnavailable(_))
            ));
        }
        assert!(!lock.exists());

        let store = VectorStore::open(&path).unwrap();
        assert_eq!(store.list_collections(), vec!["docs".to_string()]);
        let results = store.search("docs", &[1.0, 0.0], 1, &TimeFilter::none()).unwrap();
        assert_eq!(ids(&results), vec!["x"]);
    }

    #[test]
    fn test_open_clears_stale_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        std::fs::write(dir.path().join(".store.db.lock"), b"").unwrap();

        let store = VectorStore::open(&path).unwrap();
        assert!(store.path().is_some());
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("store.db");
        assert!(matches!(
            VectorStore::open(&path),
            Err(RagError::StoreUnavailable(_))
        ));
    }
}
