//! Durable short-term backend over LanceDB
//!
//! Entries live in a `scratch` table keyed by `tenant_id:key`. TTL is
//! interpreted by the caller; this store just persists `expires_at` and
//! answers filtered queries.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMicrosecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::error::{MemoriaError, Result};
use crate::memory::types::{ScratchEntry, scoped_key};

use super::ShortTermBackend;

const SCRATCH_TABLE: &str = "scratch";

/// Escape a string literal for a Lance SQL predicate.
fn sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub struct LanceScratch {
    table: Table,
}

impl LanceScratch {
    /// Connect and open the scratch table, creating it on first use.
    pub async fn connect(path: &Path) -> Result<Self> {
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

        let table = if names.contains(&SCRATCH_TABLE.to_string()) {
            connection
                .open_table(SCRATCH_TABLE)
                .execute()
                .await
                .map_err(|e| MemoriaError::Storage(format!("Failed to open scratch table: {e}")))?
        } else {
            let schema = Self::schema();
            let batch = Self::empty_batch(schema.clone());
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            connection
                .create_table(SCRATCH_TABLE, Box::new(batches))
                .execute()
                .await
                .map_err(|e| MemoriaError::Storage(format!("Failed to create scratch table: {e}")))?
        };

        Ok(Self { table })
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("storage_key", DataType::Utf8, false),
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("key", DataType::Utf8, false),
            Field::new("value", DataType::Utf8, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "expires_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
        ]))
    }

    fn empty_batch(schema: Arc<Schema>) -> RecordBatch {
        let empty_strings: Vec<Option<&str>> = vec![];
        let empty_timestamps: Vec<i64> = vec![];

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings)),
                Arc::new(
                    TimestampMicrosecondArray::from(empty_timestamps.clone()).with_timezone("UTC"),
                ),
                Arc::new(TimestampMicrosecondArray::from(empty_timestamps).with_timezone("UTC")),
            ],
        )
        .expect("Schema matches columns")
    }

    fn entry_to_batch(entry: &ScratchEntry, schema: Arc<Schema>) -> Result<RecordBatch> {
        let value = serde_json::to_string(&entry.value)
            .map_err(|e| MemoriaError::Storage(format!("Failed to encode value: {e}")))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![entry.storage_key()])),
                Arc::new(StringArray::from(vec![entry.tenant_id.as_str()])),
                Arc::new(StringArray::from(vec![entry.key.as_str()])),
                Arc::new(StringArray::from(vec![value.as_str()])),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![entry.created_at.timestamp_micros()])
                        .with_timezone("UTC"),
                ),
                Arc::new(
                    TimestampMicrosecondArray::from(vec![entry.expires_at.timestamp_micros()])
                        .with_timezone("UTC"),
                ),
            ],
        )
        .map_err(|e| MemoriaError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    fn batch_to_entry(batch: &RecordBatch, row: usize) -> Result<ScratchEntry> {
        let tenant_id_array = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get tenant_id column".to_string()))?;

        let key_array = batch
            .column(2)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get key column".to_string()))?;

        let value_array = batch
            .column(3)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get value column".to_string()))?;

        let created_at_array = batch
            .column(4)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get created_at column".to_string()))?;

        let expires_at_array = batch
            .column(5)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| MemoriaError::Storage("Failed to get expires_at column".to_string()))?;

        let value: serde_json::Value = serde_json::from_str(value_array.value(row))
            .map_err(|e| MemoriaError::Storage(format!("Failed to decode value: {e}")))?;

        let created_at = Utc
            .timestamp_micros(created_at_array.value(row))
            .single()
            .ok_or_else(|| {
                MemoriaError::Storage("Failed to parse created_at timestamp".to_string())
            })?;

        let expires_at = Utc
            .timestamp_micros(expires_at_array.value(row))
            .single()
            .ok_or_else(|| {
                MemoriaError::Storage("Failed to parse expires_at timestamp".to_string())
            })?;

        Ok(ScratchEntry {
            tenant_id: tenant_id_array.value(row).to_string(),
            key: key_array.value(row).to_string(),
            value,
            created_at,
            expires_at,
        })
    }
}

#[async_trait]
impl ShortTermBackend for LanceScratch {
    async fn put(&self, entry: ScratchEntry) -> Result<()> {
        let predicate = format!("storage_key = '{}'", sql_literal(&entry.storage_key()));

        // Replace semantics: drop any previous row for the key first.
        self.table
            .delete(&predicate)
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to replace scratch entry: {e}")))?;

        let schema = Self::schema();
        let batch = Self::entry_to_batch(&entry, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to insert scratch entry: {e}")))?;

        Ok(())
    }

    async fn get(&self, tenant_id: &str, key: &str) -> Result<Option<ScratchEntry>> {
        let predicate = format!(
            "storage_key = '{}'",
            sql_literal(&scoped_key(tenant_id, key))
        );

        let stream = self
            .table
            .query()
            .only_if(predicate)
            .execute()
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to query scratch entry: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to collect query results: {e}")))?;

        for batch in &batches {
            if batch.num_rows() > 0 {
                return Ok(Some(Self::batch_to_entry(batch, 0)?));
            }
        }

        Ok(None)
    }

    async fn delete(&self, tenant_id: &str, key: &str) -> Result<bool> {
        let exists = self.get(tenant_id, key).await?.is_some();

        if exists {
            let predicate = format!(
                "storage_key = '{}'",
                sql_literal(&scoped_key(tenant_id, key))
            );
            self.table
                .delete(&predicate)
                .await
                .map_err(|e| MemoriaError::Storage(format!("Failed to delete scratch entry: {e}")))?;
        }

        Ok(exists)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let predicate = format!("expires_at < {}", now.timestamp_micros());

        let expired = self
            .table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| MemoriaError::Storage(format!("Failed to count expired entries: {e}")))?;

        if expired > 0 {
            self.table
                .delete(&predicate)
                .await
                .map_err(|e| MemoriaError::Storage(format!("Failed to sweep expired entries: {e}")))?;
        }

        Ok(expired)
    }

    fn name(&self) -> &'static str {
        "lance"
    }
}
