
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    DistanceMetric, Document, IndexEntry, IndexManifest, IndexStore, ScoredDocument, TABLE_NAME,
    VECTORS_DIR, check_dimension,
};
use crate::{AssistantError, Result};

/// Persisted index backed by a LanceDB dataset
pub struct LanceIndex {
    table: Table,
    manifest: IndexManifest,
}

impl LanceIndex {
    /// Open a previously written index directory
    ///
    /// # Arguments
    /// * `index_dir` - Directory containing `index.toml` and the `vectors` dataset
    ///
    /// # Returns
    /// * `Result<Self>` - The opened index, or `IndexNotFound` when nothing is there
    pub async fn open(index_dir: &Path) -> Result<Self> {
        let manifest = IndexManifest::read(index_dir)?;

        let vectors_path = index_dir.join(VECTORS_DIR);
        if !vectors_path.exists() {
            return Err(AssistantError::IndexNotFound {
                path: index_dir.to_path_buf(),
                reason: format!("missing {VECTORS_DIR} dataset"),
            });
        }

        let connection = Self::connect(&vectors_path).await?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| AssistantError::Index(format!("Failed to list tables: {}", e)))?;

        if !table_names.iter().any(|name| name == TABLE_NAME) {
            return Err(AssistantError::IndexNotFound {
                path: index_dir.to_path_buf(),
                reason: format!("dataset has no '{TABLE_NAME}' table"),
            });
        }

        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| AssistantError::Index(format!("Failed to open table: {}", e)))?;

        let stored_dimension = Self::detect_vector_dimension(&table).await?;
        if stored_dimension != manifest.dimension {
            return Err(AssistantError::Index(format!(
                "Manifest declares {} dimensions but the dataset stores {}",
                manifest.dimension, stored_dimension
            )));
        }

        debug!(
            "Opened LanceDB index at {:?} with {} dimensions",
            vectors_path, stored_dimension
        );
        Ok(Self { table, manifest })
    }

    /// Persist `entries` as a new index at `index_dir`, replacing any existing table
    ///
    /// The entries must already be embedded with `manifest.embedding_model`.
    pub async fn write(
        index_dir: &Path,
        mut manifest: IndexManifest,
        entries: &[IndexEntry],
    ) -> Result<Self> {
        for entry in entries {
            if entry.vector.len() != manifest.dimension {
                return Err(AssistantError::Index(format!(
                    "Document '{}' has a {}-dimensional vector, expected {}",
                    entry.document.id,
                    entry.vector.len(),
                    manifest.dimension
                )));
            }
        }

        let vectors_path = index_dir.join(VECTORS_DIR);
        std::fs::create_dir_all(&vectors_path)?;
        let connection = Self::connect(&vectors_path).await?;

        let table_names = connection.table_names().execute().await.map_err(|e| {
            AssistantError::Index(format!("Failed to list tables for drop: {}", e))
        })?;
        if table_names.iter().any(|name| name == TABLE_NAME) {
            warn!("Replacing existing '{}' table at {:?}", TABLE_NAME, vectors_path);
            connection
                .drop_table(TABLE_NAME)
                .await
                .map_err(|e| AssistantError::Index(format!("Failed to drop table: {}", e)))?;
        }

        let schema = create_schema(manifest.dimension);
        let table = connection
            .create_empty_table(TABLE_NAME, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| AssistantError::Index(format!("Failed to create table: {}", e)))?;

        if !entries.is_empty() {
            let record_batch = create_record_batch(schema, manifest.dimension, entries)?;
            let batch_schema = record_batch.schema();
            let reader =
                RecordBatchIterator::new(std::iter::once(Ok(record_batch)), batch_schema);
            table
                .add(reader)
                .execute()
                .await
                .map_err(|e| AssistantError::Index(format!("Failed to insert documents: {}", e)))?;
        }

        manifest.document_count = entries.len();
        manifest.write(index_dir)?;

        info!(
            "Wrote index with {} documents to {}",
            entries.len(),
            index_dir.display()
        );
        Ok(Self { table, manifest })
    }

    async fn connect(vectors_path: &Path) -> Result<Connection> {
        let uri = format!("file://{}", vectors_path.display());
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AssistantError::Index(format!("Failed to connect to LanceDB: {}", e)))
    }

    /// Detect vector dimension from the table schema
    async fn detect_vector_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| AssistantError::Index(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size).map_err(|_| {
                        AssistantError::Index(format!("Invalid vector dimension: {}", size))
                    });
                }
            }
        }

        Err(AssistantError::Index(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Parse search results from LanceDB stream into scored documents
    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<ScoredDocument>> {
        let mut scored = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| AssistantError::Index(format!("Failed to read result stream: {}", e)))?
        {
            scored.extend(self.parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results from stream", scored.len());
        Ok(scored)
    }

    fn parse_search_batch(&self, batch: &RecordBatch) -> Result<Vec<ScoredDocument>> {
        let ids = string_column(batch, "id")?;
        let texts = string_column(batch, "text")?;
        let metadata_json = string_column(batch, "metadata")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let metric = self.manifest.metric;
        let mut scored = Vec::with_capacity(batch.num_rows());

        for row in 0..batch.num_rows() {
            let metadata = if metadata_json.is_null(row) {
                Default::default()
            } else {
                serde_json::from_str(metadata_json.value(row)).map_err(|e| {
                    AssistantError::Index(format!(
                        "Invalid metadata for document '{}': {}",
                        ids.value(row),
                        e
                    ))
                })?
            };

            let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            scored.push(ScoredDocument {
                document: Document {
                    id: ids.value(row).to_string(),
                    text: texts.value(row).to_string(),
                    metadata,
                },
                distance,
                score: metric.similarity(distance),
            });
        }

        Ok(scored)
    }
}

#[async_trait]
impl IndexStore for LanceIndex {
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

        debug!("Searching for {} nearest documents", k);

        let results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| AssistantError::Index(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(distance_type(self.manifest.metric))
            .limit(k)
            .execute()
            .await
            .map_err(|e| AssistantError::Index(format!("Failed to execute search: {}", e)))?;

        self.parse_search_results_stream(results).await
    }

    async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| AssistantError::Index(format!("Failed to count rows: {}", e)))
    }
}

const fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::L2 => DistanceType::L2,
    }
}

/// Create schema with the specified vector dimension
fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, true),
    ]))
}

fn create_record_batch(
    schema: Arc<Schema>,
    vector_dim: usize,
    entries: &[IndexEntry],
) -> Result<RecordBatch> {
    let len = entries.len();
    let mut ids = Vec::with_capacity(len);
    let mut texts = Vec::with_capacity(len);
    let mut metadata = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);

    for entry in entries {
        ids.push(entry.document.id.as_str());
        texts.push(entry.document.text.as_str());
        metadata.push(
            serde_json::to_string(&entry.document.metadata)
                .map_err(|e| AssistantError::Index(format!("Failed to encode metadata: {}", e)))?,
        );
        flat_values.extend_from_slice(&entry.vector);
    }

    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| AssistantError::Index(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(texts)),
        Arc::new(StringArray::from(metadata)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| AssistantError::Index(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| AssistantError::Index(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| AssistantError::Index(format!("Invalid {} column type", name)))
}
