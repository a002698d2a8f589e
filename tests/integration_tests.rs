//! Integration tests for the store and retriever
//!
//! Exercises a file-backed store through the public API: time-window search,
//! self-match suppression, ranking, dimension checks and the lock lifecycle.

use std::sync::Arc;
use timerag::storage::lock_path_for;
use timerag::{
    HashingEmbedder, QueryContent, RagError, Record, Retrieve, Retriever, TimeFilter,
    VectorIndexParams, VectorStore, create_index_params, create_schema,
};

fn params() -> VectorIndexParams {
    VectorIndexParams {
        max_connections: 16,
        ef_construction: 200,
        ef_search: 64,
    }
}

fn create(store: &VectorStore, name: &str, dim: usize) -> Result<(), RagError> {
    let schema = create_schema("integration", dim, 1024)?;
    let index_config = create_index_params(&schema, params())?;
    store.create_collection(name, schema, index_config)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn test_time_window_and_self_match() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let store = VectorStore::open(temp_dir.path().join("scenario.db"))?;
    create(&store, "docs", 3)?;

    store.insert(
        "docs",
        vec![
            Record::new("a", "alpha", 100, vec![1.0, 0.0, 0.0]),
            Record::new("b", "beta", 200, vec![0.0, 1.0, 0.0]),
        ],
    )?;

    // "a" is identical to the query and is suppressed
    let results = store.search("docs", &[1.0, 0.0, 0.0], 8, &TimeFilter::none())?;
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["b"]);

    let results = store.search("docs", &[0.9, 0.1, 0.0], 8, &TimeFilter::since(150))?;
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["b"]);

    let results = store.search("docs", &[0.9, 0.1, 0.0], 8, &TimeFilter::between(100, 200))?;
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    Ok(())
}

#[test]
fn test_results_are_limited_and_ranked() -> Result<(), Box<dyn std::error::Error>> {
    let store = VectorStore::in_memory()?;
    create(&store, "docs", 32)?;

    let embedder = HashingEmbedder::new(32, true)?;
    let records: Vec<Record> = (0..40)
        .map(|i| {
            let text = format!("document number {} about topic {}", i, i % 7);
            let vector = embedder.embed_sync(&text);
            Record::new(format!("d{}", i), text, i as i64, vector)
        })
        .collect();
    let vectors: Vec<(String, Vec<f32>)> = records
        .iter()
        .map(|r| (r.id.clone(), r.vector.clone()))
        .collect();
    store.insert("docs", records)?;

    let query = embedder.embed_sync("a question about topic 3");
    for limit in [1, 5, 10] {
        let results = store.search("docs", &query, limit, &TimeFilter::none())?;
        assert_eq!(results.len(), limit);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    let best = vectors
        .iter()
        .max_by(|a, b| dot(&a.1, &query).total_cmp(&dot(&b.1, &query)))
        .map(|(id, _)| id.clone());
    let top = store.search("docs", &query, 1, &TimeFilter::none())?;
    assert_eq!(Some(top[0].id.clone()), best);
    approx::assert_relative_eq!(top[0].score, dot(&top[0].vector, &query), epsilon = 1e-5);

    Ok(())
}

#[test]
fn test_time_filter_only_admits_window() -> Result<(), Box<dyn std::error::Error>> {
    let store = VectorStore::in_memory()?;
    create(&store, "docs", 4)?;

    let records: Vec<Record> = (0..20)
        .map(|i| {
            let angle = i as f32 * 0.3;
            Record::new(
                format!("r{}", i),
                format!("record {}", i),
                i * 10,
                vec![angle.cos(), angle.sin(), 0.5, 0.1],
            )
        })
        .collect();
    store.insert("docs", records)?;

    let window = TimeFilter::between(50, 120);
    let results = store.search("docs", &[1.0, 0.0, 0.0, 0.0], 20, &window)?;
    assert_eq!(results.len(), 8);
    for result in &results {
        let record = store.get("docs", &result.id)?.ok_or("missing record")?;
        assert!((50..=120).contains(&record.ingest_time));
    }
    assert_eq!(store.count_in_window("docs", &window)?, 8);

    let results = store.search("docs", &[1.0, 0.0, 0.0, 0.0], 3, &TimeFilter::until(20))?;
    let mut ids: Vec<String> = results.into_iter().map(|r| r.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["r0", "r1", "r2"]);

    Ok(())
}

#[tokio::test]
async fn test_empty_window_is_no_relevant_data() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(VectorStore::in_memory()?);
    create(&store, "docs", 8)?;

    let embedder = HashingEmbedder::new(8, true)?;
    store.insert(
        "docs",
        vec![Record::new("old", "old news", 1_000, embedder.embed_sync("old news"))],
    )?;

    let retriever = Retriever::new(store.clone(), Arc::new(embedder), "docs")?;

    let result = retriever
        .retrieve(QueryContent::Text("news"), 8, &TimeFilter::since(2_000))
        .await;
    assert!(matches!(result, Err(RagError::NoRelevantDataFound)));

    // Inverted window admits nothing
    let result = retriever
        .retrieve(QueryContent::Text("news"), 8, &TimeFilter::between(2_000, 1_000))
        .await;
    assert!(result.is_err_and(|e| e.is_no_relevant_data()));

    let context = retriever
        .retrieve(QueryContent::Text("news"), 8, &TimeFilter::until(2_000))
        .await?;
    assert_eq!(context.best().id, "old");

    Ok(())
}

#[test]
fn test_dimension_mismatch_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let store = VectorStore::in_memory()?;

    for dim in [2usize, 3, 16] {
        let name = format!("dim{}", dim);
        create(&store, &name, dim)?;
        store.insert(&name, vec![Record::new("x", "x", 0, vec![0.5; dim])])?;

        for wrong in [dim - 1, dim + 1] {
            let result = store.search(&name, &vec![0.1; wrong], 4, &TimeFilter::none());
            assert!(matches!(
                result,
                Err(RagError::DimensionMismatch { expected, actual }) if expected == dim && actual == wrong
            ));

            let result = store.insert(&name, vec![Record::new("y", "y", 0, vec![0.1; wrong])]);
            assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
        }
        assert_eq!(store.count(&name)?, 1);
    }

    Ok(())
}

#[test]
fn test_store_persists_and_releases_lock() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("persist.db");
    let lock_path = lock_path_for(&path)?;

    {
        let store = VectorStore::open(&path)?;
        assert!(lock_path.exists());
        create(&store, "docs", 2)?;
        store.insert(
            "docs",
            vec![
                Record::new("a", "first", 10, vec![1.0, 0.0]),
                Record::new("b", "second", 20, vec![0.0, 1.0]),
            ],
        )?;

        let second = VectorStore::open(&path);
        assert!(matches!(second, Err(RagError::StoreUnavailable(_))));
    }
    assert!(!lock_path.exists());

    // A lock left behind by a crashed process does not block opening
    std::fs::write(&lock_path, b"")?;

    let store = VectorStore::open(&path)?;
    assert_eq!(store.list_collections(), vec!["docs".to_string()]);
    assert_eq!(store.count("docs")?, 2);

    let results = store.search("docs", &[0.2, 0.8], 1, &TimeFilter::none())?;
    assert_eq!(results[0].id, "b");
    assert_eq!(results[0].text, "second");

    Ok(())
}

#[test]
fn test_store_directory_must_exist() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("missing").join("store.db");
    assert!(matches!(
        VectorStore::open(path),
        Err(RagError::StoreUnavailable(_))
    ));
}
