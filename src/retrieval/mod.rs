//! Top-k document retrieval for an embedded query


use std::sync::Arc;
use tracing::debug;

use crate::index::{Document, IndexStore, ScoredDocument};
use crate::{AssistantError, Result};

/// Documents selected as context for one question, closest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredDocument>,
}

impl RetrievalResult {
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Document texts in rank order
    #[inline]
    pub fn texts(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.document.text.as_str()).collect()
    }

    #[inline]
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.hits.iter().map(|hit| &hit.document)
    }
}

impl From<Vec<ScoredDocument>> for RetrievalResult {
    #[inline]
    fn from(hits: Vec<ScoredDocument>) -> Self {
        Self { hits }
    }
}

pub struct Retriever {
    index: Arc<dyn IndexStore>,
    top_k: usize,
    max_distance: Option<f32>,
}

impl Retriever {
    /// Create a retriever returning at most `top_k` documents
    ///
    /// Hits farther than `max_distance` (in the index's metric) are dropped.
    pub fn new(index: Arc<dyn IndexStore>, top_k: usize, max_distance: Option<f32>) -> Result<Self> {
        if top_k == 0 {
            return Err(AssistantError::InvalidInput(
                "top_k must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            index,
            top_k,
            max_distance,
        })
    }

    #[inline]
    pub fn index(&self) -> &Arc<dyn IndexStore> {
        &self.index
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, query_vector: &[f32]) -> Result<RetrievalResult> {
        let mut hits = self.index.search(query_vector, self.top_k).await?;
        let found = hits.len();

        if let Some(max_distance) = self.max_distance {
            hits.retain(|hit| hit.distance <= max_distance);
        }

        debug!(
            "Retrieved {} documents ({} before distance cut-off)",
            hits.len(),
            found
        );
        Ok(RetrievalResult { hits })
    }
}
