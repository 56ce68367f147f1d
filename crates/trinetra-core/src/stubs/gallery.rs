//! Brute-force in-memory gallery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::SearchError;
use crate::traits::{GalleryPayload, SearchHit, SimilaritySearch};
use crate::types::cosine;

/// Exact-scan similarity search over a map. Small galleries only; the
/// production gallery is the HNSW index in the resolver crate.
///
/// Carries an availability switch so outage handling can be tested.
pub struct MemoryGallery {
    entries: RwLock<HashMap<String, (Vec<f32>, GalleryPayload)>>,
    available: AtomicBool,
}

impl MemoryGallery {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Flip the simulated backend availability.
    pub fn set_available(&self, up: bool) {
        self.available.store(up, Ordering::SeqCst);
    }

    pub fn insert(&self, customer_id: &str, embedding: Vec<f32>, payload: GalleryPayload) {
        self.entries
            .write()
            .insert(customer_id.to_string(), (embedding, payload));
    }

    fn check_available(&self) -> Result<(), SearchError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SearchError::Unavailable("gallery offline".into()))
        }
    }
}

#[async_trait]
impl SimilaritySearch for MemoryGallery {
    async fn top_k(
        &self,
        embedding: &[f32],
        k: usize,
        _ef: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.check_available()?;
        let entries = self.entries.read();
        let mut hits: Vec<SearchHit> = entries
            .iter()
            .map(|(id, (vector, payload))| SearchHit {
                customer_id: id.clone(),
                score: cosine(embedding, vector),
                payload: payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn upsert(
        &self,
        customer_id: &str,
        embedding: &[f32],
        payload: GalleryPayload,
    ) -> Result<(), SearchError> {
        self.check_available()?;
        self.insert(customer_id, embedding.to_vec(), payload);
        Ok(())
    }

    async fn fetch(
        &self,
        customer_id: &str,
    ) -> Result<Option<(Vec<f32>, GalleryPayload)>, SearchError> {
        self.check_available()?;
        Ok(self.entries.read().get(customer_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 8];
        v[i] = 1.0;
        v
    }

    #[tokio::test]
    async fn ranks_by_cosine() {
        let g = MemoryGallery::new();
        g.insert("a", basis(0), GalleryPayload::default());
        g.insert("b", basis(1), GalleryPayload::default());
        let hits = g.top_k(&basis(1), 2, 50).await.unwrap();
        assert_eq!(hits[0].customer_id, "b");
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[1].score, 0.0);
    }

    #[tokio::test]
    async fn unavailable_gallery_errors() {
        let g = MemoryGallery::new();
        g.set_available(false);
        assert!(matches!(
            g.top_k(&basis(0), 1, 50).await,
            Err(SearchError::Unavailable(_))
        ));
        g.set_available(true);
        assert!(g.top_k(&basis(0), 1, 50).await.is_ok());
    }
}
