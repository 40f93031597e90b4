//! Durable long-term backend over LanceDB
//!
//! Records live in an `archive` table with a fixed-size-list embedding
//! column. ANN search produces a candidate pool that is re-ranked
//! in-process by the shared contract, so results match the in-memory
//! fallback exactly.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, BooleanArray, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::query::{ExecutableQuery, QueryBase};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{MemoriaError, Result};
use crate::memory::types::{MemoryRecord, SearchResult};

use super::filter::RecordFilter;
use super::ranking;
use super::{LongTermBackend, StoreOutcome, TenantUsage};

const ARCHIVE_TABLE: &str = "archive";

/// Floor for the ANN candidate pool, so small limits still see enough
/// of the index to re-rank exactly.
const MIN_CANDIDATE_POOL: usize = 64;

/// Escape a string literal for a Lance SQL predicate.
fn sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub struct LanceArchive {
    table: Table,
    dimension: usize,
    candidate_multiplier: usize,
    // Serializes dedup-sensitive insert paths per (tenant, hash).
    insert_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LanceArchive {
    /// Connect and open the archive table, creating it on first use.
    pub async fn connect(
        path: &Path,
        dimension: usize,
        candidate_multiplier: usize,
    ) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| MemoriaError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| MemoriaError::BackendUnavailable(format!("LanceDB connect failed: {e}")))?;

        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MemoriaError::BackendUnavailable(format!("Failed to list tables: {e}")))?;

        let table = if names.contains(&ARCHIVE_TABLE.to_string()) {
            connection
                .open_table(ARCHIVE_TABLE)
                .execute()
                .await
                .map_err(|e| MemoriaError::Storage(format!("Failed to open archive table: {e}")))?
        } else {
            let schema = Self::schema(dimension);
            let batch = Self::empty_batch(schema.clone(), dimension);
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            connection
                .create_table(ARCHIVE_TABLE, Box::new(batches))
                .execute()
                .await
                .map_err(|e| MemoriaError::Storage(format!("Failed to create archive table: {e}")))?
        };

        Ok(Self {
            table,
            dimension,
            candidate_multiplier: candidate_multiplier.max(1),
            insert_locks: DashMap::new(),
        })
    }

    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new("retained", DataType::Boolean, false),
        ]))
    }

    fn empty_batch(schema: Arc<Schema>, dimension: usize) -> RecordBatch {
        let empty_strings: Vec<Option<&str>> = vec![];
        let empty_timestamps: Vec<i64> = vec![];
        let empty_bools: Vec<bool> = vec![];
        let empty_embeddings: Vec<Option<Vec<Option<f32>>>> = vec![];

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(empty_embeddings, dimension as i32)),
                Arc::new(StringArray::from(empty_strings)),
                Arc::new(TimestampMicrosecondArray::from(empty_timestamps).with_timezone("UTC")),
                Arc::new(BooleanArray::from(empty_bools)),
            ],
        )
        .expect("Schema matches columns")
    }

    fn record_to_batch(record: &MemoryRecord, schema: Arc<Schema>, dimension: usize) -> Result<RecordBatch> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| MemoriaError::Storage(format!("Failed to encode metadata: {e}")))?;

        let embedding: Vec<Option<Vec<Option<f32>>>> =
            vec![Some(record.embedding.iter().map(|&v| Some(v)).collect())];

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![record.id.to_string()])),
                Arc::new(StringArray::from(vec![record.tenant_id.as_str()])),
                Arc::new(StringArray::from(vec![record.content.as_str()])),
                Arc::new(StringArray::from(vec![record.content_hash.as_str()])),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embedding, dimension as i32)),
                Arc::new(StringArray::from(vec![metadata.as_str()])),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![record.created_at.timestamp_micros()])
                        .with_timezone("UTC"),
                ),
                Arc::new(BooleanArray::from(vec![record.retained])),
            ],
        )
        .map_err(|e| MemoriaError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<MemoryRecord> {
        let id_array = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get id column".to_string()))?;

        let tenant_id_array = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get tenant_id column".to_string()))?;

        let content_array = batch
            .column(2)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get content column".to_string()))?;

        let content_hash_array = batch
            .column(3)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get content_hash column".to_string()))?;

        let embedding_array = batch
            .column(4)
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get embedding column".to_string()))?;

        let metadata_array = batch
            .column(5)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get metadata column".to_string()))?;

        let created_at_array = batch
            .column(6)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get created_at column".to_string()))?;

        let retained_array = batch
            .column(7)
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get retained column".to_string()))?;

        let id = Uuid::parse_str(id_array.value(row))
            .map_err(|e| MemoriaError::Storage(format!("Failed to parse UUID: {e}")))?;

        let embedding_list = embedding_array.value(row);
        let embedding_values = embedding_list
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get embedding values".to_string()))?;
        let embedding: Vec<f32> = (0..embedding_values.len())
            .map(|i| embedding_values.value(i))
            .collect();

        let metadata = serde_json::from_str(metadata_array.value(row))
            .map_err(|e| MemoriaError::Storage(format!("Failed to decode metadata: {e}")))?;

        let created_at = Utc
            .timestamp_micros(created_at_array.value(row))
            .single()
            .ok_or_else(|| {
                MemoriaError::Storage("Failed to parse created_at timestamp".to_string())
            })?;

        Ok(MemoryRecord {
            id,
            tenant_id: tenant_id_array.value(row).to_string(),
            content: content_array.value(row).to_string(),
            content_hash: content_hash_array.value(row).to_string(),
            embedding,
            metadata,
            created_at,
            retained: retained_array.value(row),
        })
    }

    async fn collect_records(&self, predicate: String) -> Result<Vec<MemoryRecord>> {
        let stream = self
            .table
            .query()
            .only_if(predicate)
            .execute()
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to query archive: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to collect query results: {e}")))?;

        let mut records = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                records.push(Self::batch_to_record(batch, row)?);
            }
        }
        Ok(records)
    }

    async fn insert(&self, record: &MemoryRecord) -> Result<()> {
        let schema = Self::schema(self.dimension);
        let batch = Self::record_to_batch(record, schema.clone(), self.dimension)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to insert record: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl LongTermBackend for LanceArchive {
    async fn insert_unique(&self, record: MemoryRecord) -> Result<StoreOutcome> {
        let lock_key = format!("{}:{}", record.tenant_id, record.content_hash);
        let lock = self
            .insert_locks
            .entry(lock_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let outcome = {
            let _guard = lock.lock().await;

            match self
                .find_by_hash(&record.tenant_id, &record.content_hash)
                .await?
            {
                Some(existing) => StoreOutcome::Duplicate(existing),
                None => {
                    let id = record.id;
                    self.insert(&record).await?;
                    StoreOutcome::Inserted(id)
                }
            }
        };

        drop(lock);
        self.insert_locks
            .remove_if(&lock_key, |_, lock| Arc::strong_count(lock) == 1);

        Ok(outcome)
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<MemoryRecord>> {
        let predicate = format!(
            "id = '{id}' AND tenant_id = '{}'",
            sql_literal(tenant_id)
        );
        Ok(self.collect_records(predicate).await?.into_iter().next())
    }

    async fn find_by_hash(&self, tenant_id: &str, content_hash: &str) -> Result<Option<Uuid>> {
        let predicate = format!(
            "tenant_id = '{}' AND content_hash = '{}'",
            sql_literal(tenant_id),
            sql_literal(content_hash)
        );
        Ok(self
            .collect_records(predicate)
            .await?
            .into_iter()
            .next()
            .map(|record| record.id))
    }

    async fn search(
        &self,
        tenant_id: &str,
        query_embedding: &[f32],
        limit: usize,
        min_similarity: f32,
        filter: &RecordFilter,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut predicate = format!("tenant_id = '{}'", sql_literal(tenant_id));
        if let Some(clause) = filter.to_sql_clause() {
            predicate = format!("{predicate} AND {clause}");
        }

        let candidate_limit = (limit * self.candidate_multiplier).max(MIN_CANDIDATE_POOL);

        let stream = self
            .table
            .query()
            .nearest_to(query_embedding)
            .map_err(|e| MemoriaError::Storage(format!("Failed to create vector query: {e}")))?
            .only_if(predicate)
            .limit(candidate_limit)
            .execute()
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to execute search: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to collect search results: {e}")))?;

        let mut candidates = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let record = Self::batch_to_record(batch, row)?;
                // Tag clauses are invisible to SQL; check them here.
                if filter.matches(&record) {
                    candidates.push(record);
                }
            }
        }

        Ok(ranking::rank(
            candidates,
            query_embedding,
            limit,
            min_similarity,
        ))
    }

    async fn mark_retained(&self, tenant_id: &str, id: Uuid) -> Result<bool> {
        let update_result = self
            .table
            .update()
            .only_if(format!(
                "id = '{id}' AND tenant_id = '{}'",
                sql_literal(tenant_id)
            ))
            .column("retained", "true")
            .execute()
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to mark record retained: {e}")))?;

        Ok(update_result.rows_updated > 0)
    }

    async fn purge(&self, tenant_id: &str, id: Uuid) -> Result<bool> {
        let predicate = format!(
            "id = '{id}' AND tenant_id = '{}' AND retained = false",
            sql_literal(tenant_id)
        );

        let matched = self
            .table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to count purge target: {e}")))?;

        if matched > 0 {
            self.table
                .delete(&predicate)
                .await
                .map_err(|e| MemoriaError::Storage(format!("Failed to purge record: {e}")))?;
        }

        Ok(matched > 0)
    }

    async fn purge_older_than(&self, tenant_id: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let predicate = format!(
            "tenant_id = '{}' AND created_at < {} AND retained = false",
            sql_literal(tenant_id),
            cutoff.timestamp_micros()
        );

        let matched = self
            .table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to count sweep targets: {e}")))?;

        if matched > 0 {
            self.table
                .delete(&predicate)
                .await
                .map_err(|e| MemoriaError::Storage(format!("Failed to sweep records: {e}")))?;
        }

        Ok(matched)
    }

    async fn usage(&self, tenant_id: &str) -> Result<TenantUsage> {
        let predicate = format!("tenant_id = '{}'", sql_literal(tenant_id));
        let records = self.collect_records(predicate).await?;

        Ok(TenantUsage {
            records: records.len() as u64,
            content_bytes: records.iter().map(|r| r.content.len() as u64).sum(),
        })
    }

    fn name(&self) -> &'static str {
        "lance"
    }
}
