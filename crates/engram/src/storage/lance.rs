use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::embedding::Embedder;
use crate::error::{EngramError, Result};
use crate::memory::types::{MemoryRecord, Metadata, SearchHit};
use crate::storage::LongTermStore;

const DISTANCE_COLUMN: &str = "_distance";

/// LanceDB-backed long-term store.
///
/// Each record is stored with its embedding in a single table; search is a
/// cosine nearest-neighbour query over the `embedding` column.
pub struct LanceStore<E> {
    connection: Connection,
    table: Table,
    embedder: E,
    data_dir: PathBuf,
}

impl<E: Embedder> LanceStore<E> {
    /// Open the store described by `config`, creating directory and table if needed.
    pub async fn from_config(config: &StorageConfig, embedder: E) -> Result<Self> {
        Self::open(&config.data_dir, &config.table_name, embedder).await
    }

    /// Open `table_name` under `path`, creating it when missing.
    ///
    /// An existing table whose embedding width differs from `embedder`
    /// is rejected.
    pub async fn open(path: &Path, table_name: &str, embedder: E) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let uri = path
            .to_str()
            .ok_or_else(|| EngramError::InvalidConfiguration("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri).execute().await.map_err(|e| {
            EngramError::ProviderUnavailable(format!("Failed to connect to LanceDB: {e}"))
        })?;

        let dimension = embedder.dimension();
        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| EngramError::ProviderUnavailable(format!("Failed to list tables: {e}")))?;

        let table = if names.iter().any(|name| name == table_name) {
            tracing::debug!("Opening existing table {table_name}");
            let table = connection
                .open_table(table_name)
                .execute()
                .await
                .map_err(|e| {
                    EngramError::ProviderUnavailable(format!("Failed to open table: {e}"))
                })?;
            Self::check_dimension(&table, dimension).await?;
            table
        } else {
            tracing::info!("Creating table {table_name} at {}", path.display());
            let schema = Self::schema(dimension);
            let batches =
                RecordBatchIterator::new(vec![Ok(RecordBatch::new_empty(schema.clone()))], schema);
            connection
                .create_table(table_name, Box::new(batches))
                .execute()
                .await
                .map_err(|e| {
                    EngramError::ProviderUnavailable(format!("Failed to create table: {e}"))
                })?
        };

        Ok(Self {
            connection,
            table,
            embedder,
            data_dir: path.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    /// Whether a table called `name` exists in the same database
    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| EngramError::ProviderUnavailable(format!("Failed to list tables: {e}")))?;

        Ok(names.iter().any(|n| n == name))
    }

    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ]))
    }

    async fn check_dimension(table: &Table, dimension: usize) -> Result<()> {
        let schema = table
            .schema()
            .await
            .map_err(|e| EngramError::ProviderUnavailable(format!("Failed to read schema: {e}")))?;

        match schema.field_with_name("embedding").map(|f| f.data_type()) {
            Ok(DataType::FixedSizeList(_, size)) if *size as usize == dimension => Ok(()),
            Ok(DataType::FixedSizeList(_, size)) => Err(EngramError::InvalidConfiguration(format!(
                "Table stores {size}-dimensional embeddings but the model produces {dimension}"
            ))),
            _ => Err(EngramError::InvalidConfiguration(
                "Table has no embedding column".to_string(),
            )),
        }
    }

    /// Convert a record and its embedding to a single-row RecordBatch
    fn record_to_batch(&self, record: &MemoryRecord, embedding: Vec<f32>) -> Result<RecordBatch> {
        let dimension = self.embedder.dimension();
        let metadata = serde_json::to_string(&record.metadata).map_err(|e| {
            EngramError::ProviderUnavailable(format!("Failed to encode metadata: {e}"))
        })?;
        let embeddings = vec![Some(embedding.into_iter().map(Some).collect::<Vec<_>>())];

        RecordBatch::try_new(
            Self::schema(dimension),
            vec![
                Arc::new(StringArray::from(vec![record.id.to_string()])),
                Arc::new(StringArray::from(vec![record.text.as_str()])),
                Arc::new(StringArray::from(vec![metadata])),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![record.created_at.timestamp_micros()])
                        .with_timezone("UTC"),
                ),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embeddings, dimension as i32)),
            ],
        )
        .map_err(|e| EngramError::ProviderUnavailable(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert an Arrow RecordBatch row back to a MemoryRecord
    fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<MemoryRecord> {
        let id_array = string_column(batch, "id")?;
        let text_array = string_column(batch, "text")?;
        let metadata_array = string_column(batch, "metadata")?;
        let created_at_array = batch
            .column_by_name("created_at")
            .and_then(|c| c.as_any().downcast_ref::<TimestampMicrosecondArray>())
            .ok_or_else(|| {
                EngramError::ProviderUnavailable("Failed to get created_at column".to_string())
            })?;

        let id = Uuid::parse_str(id_array.value(row))
            .map_err(|e| EngramError::ProviderUnavailable(format!("Failed to parse UUID: {e}")))?;

        let metadata: Metadata = serde_json::from_str(metadata_array.value(row)).map_err(|e| {
            EngramError::ProviderUnavailable(format!("Failed to decode metadata: {e}"))
        })?;

        let created_at = Utc
            .timestamp_micros(created_at_array.value(row))
            .single()
            .ok_or_else(|| {
                EngramError::ProviderUnavailable("Failed to parse created_at timestamp".to_string())
            })?;

        Ok(MemoryRecord {
            id,
            text: text_array.value(row).to_string(),
            metadata,
            created_at,
        })
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| EngramError::ProviderUnavailable(format!("Failed to get {name} column")))
}

#[async_trait]
impl<E: Embedder> LongTermStore for LanceStore<E> {
    async fn add(&self, record: &MemoryRecord) -> Result<()> {
        let embedding = self.embedder.embed(&record.text).await?;
        if embedding.len() != self.embedder.dimension() {
            return Err(EngramError::InvalidConfiguration(format!(
                "Embedding has {} dimensions, expected {}",
                embedding.len(),
                self.embedder.dimension()
            )));
        }

        let batch = self.record_to_batch(record, embedding)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        // Insert only when no row has this id
        let mut insert = self.table.merge_insert(&["id"]);
        insert.when_not_matched_insert_all();
        insert
            .execute(Box::new(batches))
            .await
            .map_err(|e| EngramError::ProviderUnavailable(format!("Failed to insert record: {e}")))?;

        tracing::debug!(
            "Stored record {} ({} chars)",
            record.id,
            record.text.chars().count()
        );
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let stream = self
            .table
            .query()
            .nearest_to(query_embedding.as_slice())
            .map_err(|e| {
                EngramError::ProviderUnavailable(format!("Failed to create vector query: {e}"))
            })?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| EngramError::ProviderUnavailable(format!("Failed to execute search: {e}")))?;

        let batches: Vec<RecordBatch> = stream.try_collect().await.map_err(|e| {
            EngramError::ProviderUnavailable(format!("Failed to collect search results: {e}"))
        })?;

        let mut hits = Vec::new();
        for batch in &batches {
            let distances = batch
                .column_by_name(DISTANCE_COLUMN)
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| {
                    EngramError::ProviderUnavailable("Failed to get distance column".to_string())
                })?;

            for row in 0..batch.num_rows() {
                let record = Self::batch_to_record(batch, row)?;
                let score = if distances.is_null(row) {
                    0.0
                } else {
                    1.0 - distances.value(row)
                };
                hits.push(SearchHit { record, score });
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| EngramError::ProviderUnavailable(format!("Failed to count records: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HashEmbedder, WrongDimensionEmbedder};

    const TABLE: &str = "long_term_memory";

    #[tokio::test]
    async fn test_open_creates_table() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(temp_dir.path(), TABLE, HashEmbedder::new())
            .await
            .unwrap();

        assert!(store.table_exists(TABLE).await.unwrap());
        assert!(!store.table_exists("other").await.unwrap());
        assert_eq!(store.table_name(), TABLE);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_creates_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("a").join("b");

        let store = LanceStore::open(&nested, TABLE, HashEmbedder::new())
            .await
            .unwrap();

        assert!(nested.exists());
        assert_eq!(store.data_dir(), nested.as_path());
    }

    #[tokio::test]
    async fn test_schema_has_correct_fields() {
        let schema = LanceStore::<HashEmbedder>::schema(384);

        let field_names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            field_names,
            vec!["id", "text", "metadata", "created_at", "embedding"]
        );

        match schema.field_with_name("embedding").unwrap().data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, 384),
            _ => panic!("Expected FixedSizeList type for embedding field"),
        }
    }

    #[tokio::test]
    async fn test_reopen_with_different_dimension_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            LanceStore::open(temp_dir.path(), TABLE, HashEmbedder::with_dimension(16))
                .await
                .unwrap();
        }

        let result =
            LanceStore::open(temp_dir.path(), TABLE, HashEmbedder::with_dimension(32)).await;
        assert!(matches!(result, Err(EngramError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_add_then_search_returns_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(temp_dir.path(), TABLE, HashEmbedder::new())
            .await
            .unwrap();

        let record = MemoryRecord::compressed_dialog("User: hi\nAssistant: hello");
        store.add(&record).await.unwrap();

        let hits = store.search("User: hi\nAssistant: hello", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record, record);
        assert!((hits[0].score - 1.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_add_is_idempotent_on_id() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(temp_dir.path(), TABLE, HashEmbedder::new())
            .await
            .unwrap();

        let record = MemoryRecord::compressed_dialog("User: again\nAssistant: once");
        store.add(&record).await.unwrap();
        store.add(&record).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let hits = store.search(&record.text, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record, record);
    }

    #[tokio::test]
    async fn test_wrong_embedding_width_is_a_configuration_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(temp_dir.path(), TABLE, WrongDimensionEmbedder::new(16))
            .await
            .unwrap();

        let err = store
            .add(&MemoryRecord::new("short vector", Metadata::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, EngramError::InvalidConfiguration(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_with_zero_k_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LanceStore::open(temp_dir.path(), TABLE, HashEmbedder::new())
            .await
            .unwrap();
        store
            .add(&MemoryRecord::new("something", Metadata::new()))
            .await
            .unwrap();

        assert!(store.search("something", 0).await.unwrap().is_empty());
    }
}
