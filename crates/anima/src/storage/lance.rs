//! LanceDB-backed memory persistence.
//!
//! One `memories` table holds content, embedding, classification, and the
//! open metadata bag. The embedding column width is fixed per store and
//! comes from the configured embedding provider.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::error::{AnimaError, Result};
use crate::memory::types::{MemoryCategory, MemoryRecord};
use crate::storage::filter::escape_sql;

const MEMORIES_TABLE: &str = "memories";

pub struct LanceMemoryStore {
    connection: Connection,
    table: Option<Table>,
    dimensions: usize,
}

impl LanceMemoryStore {
    pub async fn connect(path: &Path, dimensions: usize) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| AnimaError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to connect to LanceDB: {e}")))?;

        Ok(Self {
            connection,
            table: None,
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimensions as i32,
                ),
                false,
            ),
            Field::new("category", DataType::Utf8, false),
            Field::new("importance", DataType::Int32, false),
            Field::new("tags", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "updated_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
        ]))
    }

    fn empty_batch(&self, schema: Arc<Schema>) -> Result<RecordBatch> {
        let empty_strings: Vec<Option<&str>> = vec![];
        let empty_ints: Vec<i32> = vec![];
        let empty_timestamps: Vec<i64> = vec![];
        let empty_embeddings: Vec<Option<Vec<Option<f32>>>> = vec![];

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(empty_embeddings, self.dimensions as i32)),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(Int32Array::from(empty_ints)),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings)),
                Arc::new(
                    TimestampMicrosecondArray::from(empty_timestamps.clone()).with_timezone("UTC"),
                ),
                Arc::new(TimestampMicrosecondArray::from(empty_timestamps).with_timezone("UTC")),
            ],
        )
        .map_err(|e| AnimaError::Storage(format!("Failed to create empty batch: {e}")))
    }

    pub async fn create_table(&mut self) -> Result<()> {
        let schema = self.schema();
        let batch = self.empty_batch(schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let table = self
            .connection
            .create_table(MEMORIES_TABLE, Box::new(batches))
            .execute()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to create memories table: {e}")))?;

        self.table = Some(table);
        Ok(())
    }

    pub async fn open_table(&mut self) -> Result<()> {
        let table = self
            .connection
            .open_table(MEMORIES_TABLE)
            .execute()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to open memories table: {e}")))?;

        self.table = Some(table);
        Ok(())
    }

    pub async fn table_exists(&self) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to list tables: {e}")))?;

        Ok(names.contains(&MEMORIES_TABLE.to_string()))
    }

    /// Open the memories table, creating it on first use.
    pub async fn ensure_table(&mut self) -> Result<()> {
        if self.table_exists().await? {
            self.open_table().await
        } else {
            self.create_table().await
        }
    }

    fn table(&self) -> Result<&Table> {
        self.table
            .as_ref()
            .ok_or_else(|| AnimaError::Storage("Memories table not initialized".to_string()))
    }

    /// Convert records to an Arrow RecordBatch
    fn records_to_batch(&self, records: &[MemoryRecord]) -> Result<RecordBatch> {
        for record in records {
            if record.embedding.len() != self.dimensions {
                return Err(AnimaError::Storage(format!(
                    "Embedding width {} does not match store width {}",
                    record.embedding.len(),
                    self.dimensions
                )));
            }
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();

        let embeddings: Vec<Option<Vec<Option<f32>>>> = records
            .iter()
            .map(|r| Some(r.embedding.iter().map(|&v| Some(v)).collect()))
            .collect();

        let categories: Vec<&str> = records.iter().map(|r| r.category.as_str()).collect();
        let importances: Vec<i32> = records.iter().map(|r| r.importance).collect();

        let tags: Vec<String> = records.iter().map(|r| r.tags.join(",")).collect();
        let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();

        let metadata: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata).unwrap_or_else(|_| "{}".to_string()))
            .collect();
        let metadata_refs: Vec<&str> = metadata.iter().map(String::as_str).collect();

        let created_at: Vec<i64> = records
            .iter()
            .map(|r| r.created_at.timestamp_micros())
            .collect();
        let updated_at: Vec<i64> = records
            .iter()
            .map(|r| r.updated_at.timestamp_micros())
            .collect();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embeddings, self.dimensions as i32)),
                Arc::new(StringArray::from(categories)),
                Arc::new(Int32Array::from(importances)),
                Arc::new(StringArray::from(tag_refs)),
                Arc::new(StringArray::from(metadata_refs)),
                Arc::new(TimestampMicrosecondArray::from(created_at).with_timezone("UTC")),
                Arc::new(TimestampMicrosecondArray::from(updated_at).with_timezone("UTC")),
            ],
        )
        .map_err(|e| AnimaError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert one RecordBatch row back into a record
    fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<MemoryRecord> {
        let id_array = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| AnimaError::Storage("Failed to get id column".to_string()))?;

        let content_array = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| AnimaError::Storage("Failed to get content column".to_string()))?;

        let embedding_array = batch
            .column(2)
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| AnimaError::Storage("Failed to get embedding column".to_string()))?;

        let category_array = batch
            .column(3)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| AnimaError::Storage("Failed to get category column".to_string()))?;

        let importance_array = batch
            .column(4)
            .as_any()
            .downcast_ref::<Int32Array>()
            .ok_or_else(|| AnimaError::Storage("Failed to get importance column".to_string()))?;

        let tags_array = batch
            .column(5)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| AnimaError::Storage("Failed to get tags column".to_string()))?;

        let metadata_array = batch
            .column(6)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| AnimaError::Storage("Failed to get metadata column".to_string()))?;

        let created_at_array = batch
            .column(7)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| AnimaError::Storage("Failed to get created_at column".to_string()))?;

        let updated_at_array = batch
            .column(8)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| AnimaError::Storage("Failed to get updated_at column".to_string()))?;

        let embedding_list = embedding_array.value(row);
        let embedding_values = embedding_list
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| AnimaError::Storage("Failed to get embedding values".to_string()))?;
        let embedding: Vec<f32> = (0..embedding_values.len())
            .map(|i| embedding_values.value(i))
            .collect();

        let tags: Vec<String> = tags_array
            .value(row)
            .split(',')
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect();

        // Metadata degrades to an empty bag rather than failing the row
        let metadata = serde_json::from_str(metadata_array.value(row)).unwrap_or_default();

        let created_at = Utc
            .timestamp_micros(created_at_array.value(row))
            .single()
            .ok_or_else(|| {
                AnimaError::Storage("Failed to parse created_at timestamp".to_string())
            })?;
        let updated_at = Utc
            .timestamp_micros(updated_at_array.value(row))
            .single()
            .ok_or_else(|| {
                AnimaError::Storage("Failed to parse updated_at timestamp".to_string())
            })?;

        Ok(MemoryRecord {
            id: id_array.value(row).to_string(),
            content: content_array.value(row).to_string(),
            embedding,
            category: MemoryCategory::parse(category_array.value(row)),
            importance: importance_array.value(row),
            tags,
            metadata,
            created_at,
            updated_at,
        })
    }

    fn collect_records(batches: &[RecordBatch]) -> Result<Vec<MemoryRecord>> {
        let mut records = Vec::new();
        for batch in batches {
            for row in 0..batch.num_rows() {
                records.push(Self::batch_to_record(batch, row)?);
            }
        }
        Ok(records)
    }

    pub async fn insert(&self, record: &MemoryRecord) -> Result<()> {
        let table = self.table()?;
        let batch = self.records_to_batch(std::slice::from_ref(record))?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to insert memory: {e}")))?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let table = self.table()?;
        let stream = table
            .query()
            .only_if(format!("id = '{}'", escape_sql(id)))
            .limit(1)
            .execute()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to query memory: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to read memory results: {e}")))?;

        Ok(Self::collect_records(&batches)?.into_iter().next())
    }

    /// Delete by id. Returns whether a row existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        if self.get(id).await?.is_none() {
            return Ok(false);
        }

        let table = self.table()?;
        table
            .delete(&format!("id = '{}'", escape_sql(id)))
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to delete memory: {e}")))?;

        Ok(true)
    }

    /// Replace the row with this record's id. The caller keeps created_at
    /// and bumps updated_at.
    pub async fn replace(&self, record: &MemoryRecord) -> Result<()> {
        let table = self.table()?;
        table
            .delete(&format!("id = '{}'", escape_sql(&record.id)))
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to replace memory: {e}")))?;
        self.insert(record).await
    }

    /// Fetch the `limit` nearest rows to an embedding, optionally
    /// prefiltered. Rows come back in backend nearest-neighbor order.
    pub async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: Option<String>,
    ) -> Result<Vec<MemoryRecord>> {
        let table = self.table()?;
        let mut query = table
            .query()
            .nearest_to(embedding)
            .map_err(|e| AnimaError::Storage(format!("Failed to create vector query: {e}")))?
            .limit(limit);

        if let Some(clause) = filter {
            query = query.only_if(clause);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to run vector query: {e}")))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to read vector results: {e}")))?;

        Self::collect_records(&batches)
    }

    /// Scan rows matching a filter, unordered.
    pub async fn scan(
        &self,
        filter: Option<String>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        let table = self.table()?;
        let mut query = table.query();

        if let Some(clause) = filter {
            query = query.only_if(clause);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to scan memories: {e}")))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to read scan results: {e}")))?;

        Self::collect_records(&batches)
    }

    pub async fn count(&self, filter: Option<String>) -> Result<usize> {
        let table = self.table()?;
        table
            .count_rows(filter)
            .await
            .map_err(|e| AnimaError::Storage(format!("Failed to count memories: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::filter::RecordFilter;

    async fn test_store(dimensions: usize) -> (tempfile::TempDir, LanceMemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LanceMemoryStore::connect(dir.path(), dimensions).await.unwrap();
        store.ensure_table().await.unwrap();
        (dir, store)
    }

    fn record(content: &str, category: MemoryCategory, importance: i32, embedding: Vec<f32>) -> MemoryRecord {
        let mut r = MemoryRecord::new(content, category, importance, vec![]);
        r.embedding = embedding;
        r
    }

    #[tokio::test]
    async fn test_ensure_table_create_then_open() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = LanceMemoryStore::connect(dir.path(), 4).await.unwrap();
        assert!(!store.table_exists().await.unwrap());
        store.ensure_table().await.unwrap();
        assert!(store.table_exists().await.unwrap());

        // Reconnect opens the existing table
        let mut reopened = LanceMemoryStore::connect(dir.path(), 4).await.unwrap();
        reopened.ensure_table().await.unwrap();
        assert_eq!(reopened.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_get_roundtrip() {
        let (_dir, store) = test_store(4).await;

        let mut original = record(
            "User's cat is named Miso",
            MemoryCategory::Fact,
            7,
            vec![0.1, 0.2, 0.3, 0.4],
        );
        original.tags = vec!["pets".to_string(), "names".to_string()];
        original
            .metadata
            .insert("session_id".to_string(), serde_json::Value::from("s1"));

        store.insert(&original).await.unwrap();

        let fetched = store.get(&original.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, original.id);
        assert_eq!(fetched.content, original.content);
        assert_eq!(fetched.embedding, original.embedding);
        assert_eq!(fetched.category, MemoryCategory::Fact);
        assert_eq!(fetched.importance, 7);
        assert_eq!(fetched.tags, original.tags);
        assert_eq!(fetched.metadata, original.metadata);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (_dir, store) = test_store(4).await;
        assert!(store.get("mem_0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_wrong_width() {
        let (_dir, store) = test_store(4).await;
        let bad = record("x", MemoryCategory::Fact, 5, vec![0.1, 0.2]);
        let err = store.insert(&bad).await.unwrap_err();
        assert!(err.to_string().contains("width"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = test_store(4).await;
        let r = record("temp", MemoryCategory::Fact, 5, vec![0.0, 0.0, 0.0, 1.0]);
        store.insert(&r).await.unwrap();

        assert!(store.delete(&r.id).await.unwrap());
        assert!(!store.delete(&r.id).await.unwrap());
        assert!(store.get(&r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_rewrites_row() {
        let (_dir, store) = test_store(4).await;
        let mut r = record("before", MemoryCategory::Plan, 4, vec![0.5, 0.5, 0.0, 0.0]);
        store.insert(&r).await.unwrap();

        r.content = "after".to_string();
        r.importance = 9;
        store.replace(&r).await.unwrap();

        assert_eq!(store.count(None).await.unwrap(), 1);
        let fetched = store.get(&r.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "after");
        assert_eq!(fetched.importance, 9);
    }

    #[tokio::test]
    async fn test_nearest_orders_by_proximity() {
        let (_dir, store) = test_store(4).await;

        let close = record("close", MemoryCategory::Fact, 5, vec![1.0, 0.0, 0.0, 0.0]);
        let mid = record("mid", MemoryCategory::Fact, 5, vec![0.7, 0.7, 0.0, 0.0]);
        let far = record("far", MemoryCategory::Fact, 5, vec![0.0, 0.0, 1.0, 0.0]);
        store.insert(&far).await.unwrap();
        store.insert(&close).await.unwrap();
        store.insert(&mid).await.unwrap();

        let results = store
            .nearest(&[1.0, 0.0, 0.0, 0.0], 3, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content, "close");
        assert_eq!(results[1].content, "mid");
        assert_eq!(results[2].content, "far");
    }

    #[tokio::test]
    async fn test_nearest_with_category_prefilter() {
        let (_dir, store) = test_store(4).await;

        let fact = record("a fact", MemoryCategory::Fact, 5, vec![1.0, 0.0, 0.0, 0.0]);
        let plan = record("a plan", MemoryCategory::Plan, 5, vec![0.9, 0.1, 0.0, 0.0]);
        store.insert(&fact).await.unwrap();
        store.insert(&plan).await.unwrap();

        let filter = RecordFilter::new()
            .with_category(MemoryCategory::Plan)
            .to_sql_clause();
        let results = store
            .nearest(&[1.0, 0.0, 0.0, 0.0], 5, filter)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "a plan");
    }

    #[tokio::test]
    async fn test_scan_and_count_with_filter() {
        let (_dir, store) = test_store(4).await;

        for importance in [3, 5, 8] {
            let r = record(
                &format!("memory {importance}"),
                MemoryCategory::Insight,
                importance,
                vec![0.0, 0.0, 0.0, 1.0],
            );
            store.insert(&r).await.unwrap();
        }

        let filter = RecordFilter::new().with_min_importance(5).to_sql_clause();
        let rows = store.scan(filter.clone(), None).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(store.count(filter).await.unwrap(), 2);
        assert_eq!(store.count(None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_id_with_quote_is_escaped() {
        let (_dir, store) = test_store(4).await;
        // Ids never contain quotes in practice; the escape still must not break the query
        assert!(store.get("mem_1'; drop").await.unwrap().is_none());
    }
}
