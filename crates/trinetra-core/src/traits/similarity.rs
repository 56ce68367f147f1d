//! Gallery similarity search contract.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SearchError;

/// Per-customer metadata stored alongside the gallery vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GalleryPayload {
    #[serde(default)]
    pub vip: bool,

    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// One ANN candidate, cosine score descending order in result lists.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub customer_id: String,
    pub score: f32,
    pub payload: GalleryPayload,
}

/// Approximate nearest-neighbor search over the customer gallery.
///
/// Distance metric is cosine over L2-normalized 512-dim vectors. `ef` is
/// the search-time effort knob; the resolver raises it for billing cameras.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Top-k most similar gallery entries, sorted by descending cosine.
    async fn top_k(
        &self,
        embedding: &[f32],
        k: usize,
        ef: usize,
    ) -> Result<Vec<SearchHit>, SearchError>;

    /// Insert or replace a customer's gallery vector and payload.
    /// Used by enrollment and the drift-gated EMA update.
    async fn upsert(
        &self,
        customer_id: &str,
        embedding: &[f32],
        payload: GalleryPayload,
    ) -> Result<(), SearchError>;

    /// Fetch a customer's stored vector and payload, if enrolled.
    async fn fetch(
        &self,
        customer_id: &str,
    ) -> Result<Option<(Vec<f32>, GalleryPayload)>, SearchError>;
}
