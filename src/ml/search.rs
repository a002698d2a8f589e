//! Inner-product vector search using HNSW with an exact-scan fallback
//!
//! Vectors are addressed by slot (insertion position). The HNSW graph from
//! instant-distance is rebuilt on demand after insertions; exact search scores
//! an explicit candidate set and is used when the graph cannot supply enough
//! admissible neighbours.

use crate::error::{RagError, Result};
use crate::ml::embedding::Embedding;
use crate::storage::schema::VectorIndexParams;
use instant_distance::{Builder, HnswMap, Point, Search};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Seed for graph construction, so rebuilding the same data gives the same graph
const BUILD_SEED: u64 = 0x5eed_0f_4a55;

/// Point wrapper for instant-distance; distance is the negated inner product
#[derive(Clone, Debug)]
pub struct VectorPoint {
    pub data: Vec<f32>,
}

impl VectorPoint {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }
}

impl Point for VectorPoint {
    fn distance(&self, other: &Self) -> f32 {
        -inner_product(&self.data, &other.data)
    }
}

/// Inner product of two equal-length vectors
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// A slot and its similarity to the query (larger is more similar)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredSlot {
    pub slot: usize,
    pub score: f32,
}

/// Vector index over one collection
pub struct VectorSearchIndex {
    dimension: usize,
    params: VectorIndexParams,
    vectors: Vec<Embedding>,
    hnsw: Option<HnswMap<VectorPoint, usize>>,
}

impl VectorSearchIndex {
    /// Create new vector search index
    pub fn new(dimension: usize, params: VectorIndexParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            dimension,
            params,
            vectors: Vec::new(),
            hnsw: None,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn is_built(&self) -> bool {
        self.hnsw.is_some()
    }

    /// Vector stored at `slot`
    pub fn get_vector(&self, slot: usize) -> Option<&Embedding> {
        self.vectors.get(slot)
    }

    /// Append a vector; returns its slot. Invalidates the graph.
    pub fn add_vector(&mut self, vector: Embedding) -> Result<usize> {
        self.check_dimension(&vector)?;
        self.vectors.push(vector);
        self.hnsw = None;
        Ok(self.vectors.len() - 1)
    }

    /// Build the HNSW graph over all stored vectors
    pub fn build(&mut self) -> Result<()> {
        if self.vectors.is_empty() {
            log::debug!("No vectors to build HNSW index");
            self.hnsw = None;
            return Ok(());
        }

        if self.hnsw.is_some() {
            log::debug!("HNSW index already built");
            return Ok(());
        }

        log::info!(
            "Building HNSW index with {} vectors, dimension {}",
            self.vectors.len(),
            self.dimension
        );

        let points: Vec<VectorPoint> = self
            .vectors
            .iter()
            .map(|v| VectorPoint::new(v.clone()))
            .collect();
        let slots: Vec<usize> = (0..points.len()).collect();

        // Level multiplier from the connection budget, as in the HNSW paper.
        let ml = 1.0 / (self.params.max_connections.max(2) as f32).ln();
        let hnsw = Builder::default()
            .ef_construction(self.params.ef_construction)
            .ef_search(self.params.ef_search)
            .ml(ml)
            .seed(BUILD_SEED)
            .build(points, slots);

        self.hnsw = Some(hnsw);
        Ok(())
    }

    /// Approximate search through the HNSW graph.
    ///
    /// Walks neighbours in graph order, keeping those `admit` accepts, until `k`
    /// are found or the candidate list is exhausted. Returns `None` when the
    /// graph has not been built.
    pub fn search_approximate<F>(&self, query: &[f32], k: usize, admit: F) -> Result<Option<Vec<ScoredSlot>>>
    where
        F: Fn(usize) -> bool,
    {
        self.check_dimension(query)?;

        let Some(hnsw) = self.hnsw.as_ref() else {
            return Ok(None);
        };

        let point = VectorPoint::new(query.to_vec());
        let mut search = Search::default();
        let mut results = Vec::with_capacity(k);

        for item in hnsw.search(&point, &mut search) {
            let slot = *item.value;
            if !admit(slot) {
                continue;
            }
            results.push(ScoredSlot {
                slot,
                score: inner_product(query, &self.vectors[slot]),
            });
            if results.len() == k {
                break;
            }
        }

        sort_by_score(&mut results);
        Ok(Some(results))
    }

    /// Exact search over the given candidate slots
    pub fn search_exact<I>(&self, query: &[f32], k: usize, candidates: I) -> Result<Vec<ScoredSlot>>
    where
        I: IntoIterator<Item = usize>,
    {
        self.check_dimension(query)?;

        let slots: Vec<usize> = candidates
            .into_iter()
            .filter(|&slot| slot < self.vectors.len())
            .collect();

        let mut results: Vec<ScoredSlot> = slots
            .par_iter()
            .map(|&slot| ScoredSlot {
                slot,
                score: inner_product(query, &self.vectors[slot]),
            })
            .collect();

        sort_by_score(&mut results);
        results.truncate(k);
        Ok(results)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Descending score; equal scores keep slot order
fn sort_by_score(results: &mut [ScoredSlot]) {
    results.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.slot.cmp(&b.slot),
        other => other,
    });
}
