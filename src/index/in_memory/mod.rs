//! Exact nearest-neighbor index held in memory.
//!
//! Scans every entry on each query, which is fine for corpora of a few
//! thousand documents such as the directory of mental-health facilities.
//! Equal distances keep insertion order.

#[cfg(test)]
mod tests;

use async_trait::async_trait;

use super::{IndexEntry, IndexManifest, IndexStore, ScoredDocument, check_dimension};
use crate::{AssistantError, Result};

#[derive(Debug, Clone)]
pub struct InMemoryIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

impl InMemoryIndex {
    /// Build an index from already embedded entries
    ///
    /// Every vector must have the manifest's dimension.
    pub fn from_entries(mut manifest: IndexManifest, entries: Vec<IndexEntry>) -> Result<Self> {
        for entry in &entries {
            if entry.vector.len() != manifest.dimension {
                return Err(AssistantError::Index(format!(
                    "Document '{}' has a {}-dimensional vector, expected {}",
                    entry.document.id,
                    entry.vector.len(),
                    manifest.dimension
                )));
            }
        }

        manifest.document_count = entries.len();
        Ok(Self { manifest, entries })
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}

#[async_trait]
impl IndexStore for InMemoryIndex {
    #[inline]
    fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Err(AssistantError::InvalidInput(
                "k must be a positive integer".to_string(),
            ));
        }
        check_dimension(&self.manifest, query_vector)?;

        let metric = self.manifest.metric;
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, metric.distance(&entry.vector, query_vector)))
            .collect();

        // stable sort: ties stay in insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, distance)| ScoredDocument {
                document: self.entries[position].document.clone(),
                distance,
                score: metric.similarity(distance),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}
