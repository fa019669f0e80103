//! LanceDB-backed vector index.
//!
//! Each generation is its own LanceDB database directory with a single
//! `chunks` table.

use crate::types::{Chunk, ChunkMetadata, IndexEntry};
use crate::vector_index::{cosine_similarity, IndexStore, VectorIndex};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use campus_core::{AppError, AppResult};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;
use std::path::Path;
use std::sync::Arc;

const TABLE_NAME: &str = "chunks";

/// Store writing one LanceDB database per generation.
#[derive(Debug, Default)]
pub struct LanceDbStore;

impl LanceDbStore {
    pub fn new() -> Self {
        Self
    }

    fn schema(embedding_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document_index", DataType::UInt32, false),
            Field::new("position", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("topic", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("start", DataType::UInt64, false),
            Field::new("end", DataType::UInt64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    embedding_dim as i32,
                ),
                false,
            ),
        ]))
    }

    /// Convert entries to a single Arrow RecordBatch.
    fn entries_to_batch(entries: &[IndexEntry], embedding_dim: usize) -> AppResult<RecordBatch> {
        let schema = Self::schema(embedding_dim);

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != embedding_dim) {
            return Err(AppError::Knowledge(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                embedding_dim,
                bad.embedding.len()
            )));
        }

        let chunks: Vec<&Chunk> = entries.iter().map(|e| &e.chunk).collect();

        let ids = StringArray::from_iter_values(chunks.iter().map(|c| c.id.as_str()));
        let doc_indices = UInt32Array::from_iter_values(chunks.iter().map(|c| c.document_index));
        let positions = UInt32Array::from_iter_values(chunks.iter().map(|c| c.position));
        let texts = StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()));
        let sources = StringArray::from_iter_values(chunks.iter().map(|c| c.metadata.source.as_str()));
        let topics = StringArray::from_iter_values(chunks.iter().map(|c| c.metadata.topic.as_str()));
        let categories =
            StringArray::from_iter_values(chunks.iter().map(|c| c.metadata.category.as_str()));
        let starts = UInt64Array::from_iter_values(chunks.iter().map(|c| c.start as u64));
        let ends = UInt64Array::from_iter_values(chunks.iter().map(|c| c.end as u64));

        let values = Float32Array::from_iter_values(
            entries.iter().flat_map(|e| e.embedding.iter().copied()),
        );
        let embeddings = FixedSizeListArray::new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            embedding_dim as i32,
            Arc::new(values),
            None,
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(ids),
                Arc::new(doc_indices),
                Arc::new(positions),
                Arc::new(texts),
                Arc::new(sources),
                Arc::new(topics),
                Arc::new(categories),
                Arc::new(starts),
                Arc::new(ends),
                Arc::new(embeddings),
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create RecordBatch: {}", e)))
    }

    async fn connect(path: &Path) -> AppResult<lancedb::Connection> {
        let uri = path.to_string_lossy().to_string();
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to connect to LanceDB: {}", e)))
    }
}

#[async_trait]
impl IndexStore for LanceDbStore {
    fn backend_name(&self) -> &str {
        "lancedb"
    }

    async fn open(&self, path: &Path) -> AppResult<Box<dyn VectorIndex>> {
        if !path.exists() {
            return Err(AppError::IndexNotFound(format!("No index at {:?}", path)));
        }

        let conn = Self::connect(path).await?;
        let table = conn
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to open table: {}", e)))?;

        tracing::debug!("Opened LanceDB index at {:?}", path);

        Ok(Box::new(LanceDbIndex { table }))
    }

    async fn create(&self, path: &Path, entries: &[IndexEntry]) -> AppResult<()> {
        let embedding_dim = entries.first().map(|e| e.embedding.len()).unwrap_or(1);
        let batch = Self::entries_to_batch(entries, embedding_dim)?;
        let schema = batch.schema();

        tokio::fs::create_dir_all(path).await?;
        let conn = Self::connect(path).await?;

        conn.create_table(
            TABLE_NAME,
            RecordBatchIterator::new(vec![Ok(batch)], schema),
        )
        .execute()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to create table: {}", e)))?;

        tracing::debug!("Wrote LanceDB index with {} chunks to {:?}", entries.len(), path);
        Ok(())
    }
}

/// An opened LanceDB generation.
pub struct LanceDbIndex {
    table: Table,
}

impl LanceDbIndex {
    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| AppError::Knowledge(format!("Invalid {} column", name)))
    }

    fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a UInt32Array> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
            .ok_or_else(|| AppError::Knowledge(format!("Invalid {} column", name)))
    }

    fn u64_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a UInt64Array> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
            .ok_or_else(|| AppError::Knowledge(format!("Invalid {} column", name)))
    }

    /// Convert one result row back into a chunk and its embedding.
    fn row_to_chunk(batch: &RecordBatch, row: usize) -> AppResult<(Chunk, Vec<f32>)> {
        let embedding_list = batch
            .column_by_name("embedding")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| AppError::Knowledge("Invalid embedding column".to_string()))?;
        let values = embedding_list.value(row);
        let values = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| AppError::Knowledge("Invalid embedding values".to_string()))?;
        let embedding: Vec<f32> = (0..values.len()).map(|i| values.value(i)).collect();

        let chunk = Chunk {
            id: Self::string_column(batch, "id")?.value(row).to_string(),
            document_index: Self::u32_column(batch, "document_index")?.value(row),
            position: Self::u32_column(batch, "position")?.value(row),
            text: Self::string_column(batch, "text")?.value(row).to_string(),
            metadata: ChunkMetadata {
                source: Self::string_column(batch, "source")?.value(row).to_string(),
                topic: Self::string_column(batch, "topic")?.value(row).to_string(),
                category: Self::string_column(batch, "category")?.value(row).to_string(),
            },
            start: Self::u64_column(batch, "start")?.value(row) as usize,
            end: Self::u64_column(batch, "end")?.value(row) as usize,
        };

        Ok((chunk, embedding))
    }
}

#[async_trait]
impl VectorIndex for LanceDbIndex {
    async fn query(&self, embedding: &[f32], k: usize) -> AppResult<Vec<(Chunk, f32)>> {
        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .nearest_to(embedding.to_vec())
            .map_err(|e| AppError::Knowledge(format!("Failed to create query: {}", e)))?
            .limit(k)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to execute search: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to collect results: {}", e)))?;

        let mut hits = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                match Self::row_to_chunk(batch, row) {
                    Ok((chunk, stored)) => {
                        let score = cosine_similarity(embedding, &stored);
                        hits.push((chunk, score));
                    }
                    Err(e) => tracing::warn!("Skipping unreadable row {}: {}", row, e),
                }
            }
        }

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);

        tracing::debug!("LanceDB returned {} chunks (requested {})", hits.len(), k);
        Ok(hits)
    }

    async fn len(&self) -> AppResult<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to count rows: {}", e)))
    }
}
