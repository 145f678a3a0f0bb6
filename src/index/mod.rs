//! Read-only vector index of the domain documents
//!
//! An index directory holds an `index.toml` manifest and a LanceDB dataset:
//!
//! ```text
//! <index>/
//!   index.toml      embedding model, dimension, metric, document count
//!   vectors/        LanceDB dataset, table "documents"
//! ```
//!
//! The manifest records which embedding model produced the vectors so that a
//! query embedded with a different model is refused at load time instead of
//! silently returning meaningless neighbors.


pub mod in_memory;
pub mod lance;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::providers::normalize_model_id;
use crate::{AssistantError, Result};

pub use in_memory::InMemoryIndex;
pub use lance::LanceIndex;

pub const MANIFEST_FILE: &str = "index.toml";
pub const VECTORS_DIR: &str = "vectors";
pub const TABLE_NAME: &str = "documents";

/// A unit of retrievable knowledge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Content that was embedded and is rendered into the prompt
    pub text: String,
    /// Provenance of the document, e.g. the fields of the source record
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Document {
    #[inline]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A document paired with its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub document: Document,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine similarity`
    #[default]
    Cosine,
    /// Squared Euclidean distance
    L2,
}

impl DistanceMetric {
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a * norm_b)
            }
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        }
    }

    /// Similarity score derived from a distance, higher is better
    #[inline]
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::L2 => 1.0 / (1.0 + distance),
        }
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::L2 => f.write_str("l2"),
        }
    }
}

/// Description of a persisted index, stored next to the vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    pub document_count: usize,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    #[inline]
    pub fn new(embedding_model: &str, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            embedding_model: normalize_model_id(embedding_model),
            dimension,
            metric,
            document_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Read `<index_dir>/index.toml`
    pub fn read(index_dir: &Path) -> Result<Self> {
        if !index_dir.exists() {
            return Err(AssistantError::IndexNotFound {
                path: index_dir.to_path_buf(),
                reason: "directory does not exist".to_string(),
            });
        }

        let manifest_path = index_dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(AssistantError::IndexNotFound {
                path: index_dir.to_path_buf(),
                reason: format!("missing {MANIFEST_FILE} manifest"),
            });
        }

        let content = fs::read_to_string(&manifest_path)?;
        let manifest: Self = toml::from_str(&content).map_err(|e| {
            AssistantError::Index(format!(
                "Failed to parse {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        if manifest.dimension == 0 {
            return Err(AssistantError::Index(format!(
                "{} declares a zero vector dimension",
                manifest_path.display()
            )));
        }

        debug!(
            "Read index manifest: model={}, dimension={}, metric={}, documents={}",
            manifest.embedding_model, manifest.dimension, manifest.metric, manifest.document_count
        );
        Ok(manifest)
    }

    /// Write `<index_dir>/index.toml`, creating the directory if needed
    pub fn write(&self, index_dir: &Path) -> Result<()> {
        fs::create_dir_all(index_dir)?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| AssistantError::Index(format!("Failed to serialize manifest: {e}")))?;
        fs::write(index_dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }

    /// Fail unless the index was embedded with `live_model`
    #[inline]
    pub fn ensure_compatible(&self, live_model: &str) -> Result<()> {
        let indexed = normalize_model_id(&self.embedding_model);
        let live = normalize_model_id(live_model);
        if indexed == live {
            Ok(())
        } else {
            Err(AssistantError::IndexVersionMismatch { indexed, live })
        }
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub distance: f32,
    pub score: f32,
}

/// Nearest-neighbor search over an immutable set of documents
#[async_trait]
pub trait IndexStore: Send + Sync {
    fn manifest(&self) -> &IndexManifest;

    /// The `k` nearest documents to `query_vector`, closest first
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>>;

    async fn count(&self) -> Result<usize>;
}

/// Open the persisted index at `path`
pub async fn load_index(path: &Path) -> Result<Arc<dyn IndexStore>> {
    let index = LanceIndex::open(path).await?;
    info!(
        "Loaded index from {} ({} documents, model {})",
        path.display(),
        index.manifest().document_count,
        index.manifest().embedding_model
    );
    Ok(Arc::new(index))
}

pub(crate) fn check_dimension(manifest: &IndexManifest, vector: &[f32]) -> Result<()> {
    if vector.len() == manifest.dimension {
        Ok(())
    } else {
        Err(AssistantError::IndexVersionMismatch {
            indexed: format!("{} ({} dimensions)", manifest.embedding_model, manifest.dimension),
            live: format!("a {}-dimensional vector", vector.len()),
        })
    }
}
