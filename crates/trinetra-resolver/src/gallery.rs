//! In-process HNSW gallery.

use std::collections::HashMap;

use async_trait::async_trait;
use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use tracing::{debug, warn};

use trinetra_core::error::SearchError;
use trinetra_core::traits::{GalleryPayload, SearchHit, SimilaritySearch};
use trinetra_core::types::EMBEDDING_DIM;

/// HNSW graph parameters for the 512-dim face gallery. Higher M buys
/// recall at the cost of RAM; ef_construction buys index quality at build
/// time.
const HNSW_M: usize = 16;
const HNSW_EF_CONSTRUCTION: usize = 200;
const HNSW_MAX_ELEMENTS: usize = 100_000;
const HNSW_MAX_LAYER: usize = 16;

struct GalleryInner {
    index: Hnsw<'static, f32, DistCosine>,
    data_id_to_customer: HashMap<usize, String>,
    customer_to_data_id: HashMap<String, usize>,
    /// Stored vectors for `fetch` and for re-enrollment after updates.
    vectors: HashMap<String, Vec<f32>>,
    payloads: HashMap<String, GalleryPayload>,
    next_data_id: usize,
}

/// Customer gallery backed by an HNSW graph with cosine distance.
///
/// Updates are soft: the graph has no delete, so an upsert enrolls a fresh
/// data id and unmaps the old one; stale graph hits are filtered out of
/// search results.
pub struct HnswGallery {
    inner: RwLock<GalleryInner>,
}

impl Default for HnswGallery {
    fn default() -> Self {
        Self::new()
    }
}

impl HnswGallery {
    pub fn new() -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            HNSW_M,
            HNSW_MAX_ELEMENTS,
            HNSW_MAX_LAYER,
            HNSW_EF_CONSTRUCTION,
            DistCosine {},
        );
        Self {
            inner: RwLock::new(GalleryInner {
                index,
                data_id_to_customer: HashMap::new(),
                customer_to_data_id: HashMap::new(),
                vectors: HashMap::new(),
                payloads: HashMap::new(),
                next_data_id: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().customer_to_data_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dimension(embedding: &[f32]) -> Result<(), SearchError> {
        if embedding.len() != EMBEDDING_DIM {
            return Err(SearchError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SimilaritySearch for HnswGallery {
    async fn top_k(
        &self,
        embedding: &[f32],
        k: usize,
        ef: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        Self::check_dimension(embedding)?;
        let inner = self.inner.read();
        if inner.customer_to_data_id.is_empty() {
            return Ok(Vec::new());
        }

        // Over-fetch to survive stale graph entries left by upserts.
        let fetch_k = k + 8;
        let neighbours = inner.index.search(embedding, fetch_k, ef.max(fetch_k));

        let mut hits: Vec<SearchHit> = neighbours
            .into_iter()
            .filter_map(|n| {
                let customer_id = inner.data_id_to_customer.get(&n.d_id)?;
                Some(SearchHit {
                    customer_id: customer_id.clone(),
                    score: 1.0 - n.distance,
                    payload: inner.payloads.get(customer_id).cloned().unwrap_or_default(),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        debug!(k, returned = hits.len(), "gallery search");
        Ok(hits)
    }

    async fn upsert(
        &self,
        customer_id: &str,
        embedding: &[f32],
        payload: GalleryPayload,
    ) -> Result<(), SearchError> {
        Self::check_dimension(embedding)?;
        let mut inner = self.inner.write();

        if let Some(old_id) = inner.customer_to_data_id.remove(customer_id) {
            // Soft delete: the vector stays in the graph but stops
            // resolving to a customer.
            inner.data_id_to_customer.remove(&old_id);
            warn!(customer_id, "re-enrolling existing gallery entry");
        }

        let data_id = inner.next_data_id;
        inner.next_data_id += 1;
        inner.index.insert_slice((embedding, data_id));
        inner
            .customer_to_data_id
            .insert(customer_id.to_string(), data_id);
        inner
            .data_id_to_customer
            .insert(data_id, customer_id.to_string());
        inner
            .vectors
            .insert(customer_id.to_string(), embedding.to_vec());
        inner.payloads.insert(customer_id.to_string(), payload);
        Ok(())
    }

    async fn fetch(
        &self,
        customer_id: &str,
    ) -> Result<Option<(Vec<f32>, GalleryPayload)>, SearchError> {
        let inner = self.inner.read();
        Ok(inner.vectors.get(customer_id).map(|v| {
            (
                v.clone(),
                inner.payloads.get(customer_id).cloned().unwrap_or_default(),
            )
        }))
    }
}
