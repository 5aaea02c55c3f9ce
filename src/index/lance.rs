//! LanceDB Vector Store - 유사도 인덱스 영속화
//!
//! 인덱스 디렉토리 하나에 LanceDB 테이블과 `manifest.json`을 함께 둡니다.
//! ANN 인덱스를 만들지 않으므로 검색은 전수(flat) L2 검색입니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::manifest::IndexManifest;
use super::vector::{sort_by_distance, SearchResult, VectorEntry, VectorStore};
use crate::error::BookingError;

/// 벡터 테이블 이름
const TABLE_NAME: &str = "bookings";

/// RecordBatch 하나에 담는 최대 행 수
const BATCH_ROWS: usize = 8192;

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    path: PathBuf,
}

impl LanceVectorStore {
    /// 저장소 열기 (없으면 디렉토리 생성)
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create index directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// 이미 빌드된 인덱스 열기
    ///
    /// 디렉토리가 없으면 `BookingError::NotFound`를 반환합니다.
    pub async fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BookingError::NotFound(path.to_path_buf()).into());
        }
        Self::open(path).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("row_id", DataType::Int64, false),
            Field::new("summary", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(
        schema: Arc<Schema>,
        dimension: i32,
        entries: &[VectorEntry],
    ) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != dimension as usize)
        {
            anyhow::bail!(
                "Embedding for row {} has dimension {}, expected {}",
                bad.row_id,
                bad.embedding.len(),
                dimension
            );
        }

        let row_ids: Vec<i64> = entries.iter().map(|e| e.row_id).collect();
        let summaries: Vec<&str> = entries.iter().map(|e| e.summary.as_str()).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(row_ids)),
                Arc::new(StringArray::from(summaries)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }

    /// 기존 테이블 열기 (없으면 NotFound)
    async fn open_table(&self) -> Result<lancedb::table::Table> {
        if !self.table_exists().await {
            return Err(BookingError::NotFound(self.path.join(TABLE_NAME)).into());
        }

        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn replace_all(
        &self,
        entries: &[VectorEntry],
        manifest: &IndexManifest,
    ) -> Result<usize> {
        if entries.is_empty() {
            anyhow::bail!("Refusing to build an empty index");
        }

        let dimension = i32::try_from(manifest.dimension).context("Dimension out of range")?;
        let schema = Arc::new(Self::create_schema(dimension));

        let batches: Vec<std::result::Result<RecordBatch, ArrowError>> = entries
            .chunks(BATCH_ROWS)
            .map(|chunk| Self::entries_to_batch(schema.clone(), dimension, chunk))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(Ok)
            .collect();

        // 기존 내용 덮어쓰기
        if self.table_exists().await {
            self.db
                .drop_table(TABLE_NAME)
                .await
                .context("Failed to drop existing table")?;
        }

        let reader = RecordBatchIterator::new(batches, schema);
        self.db
            .create_table(TABLE_NAME, reader)
            .execute()
            .await
            .context("Failed to create table")?;

        manifest.write(&self.path)?;

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let table = self.open_table().await?;

        // 벡터 검색 (기본 거리: L2)
        let results = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut search_results = Vec::new();

        for batch in batches {
            let row_ids = batch
                .column_by_name("row_id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing row_id column"))?;

            let summaries = batch
                .column_by_name("summary")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing summary column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가, 제곱 L2)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                search_results.push(SearchResult {
                    row_id: row_ids.value(i),
                    summary: summaries.value(i).to_string(),
                    distance: distances.value(i).max(0.0).sqrt(),
                });
            }
        }

        sort_by_distance(&mut search_results);
        search_results.truncate(limit);

        Ok(search_results)
    }

    async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }

    async fn manifest(&self) -> Result<IndexManifest> {
        IndexManifest::read(&self.path)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_dataset;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn entry(row_id: i64, value: f32) -> VectorEntry {
        VectorEntry {
            row_id,
            summary: format!("summary {}", row_id),
            embedding: vec![value; DIM],
        }
    }

    #[tokio::test]
    async fn test_lance_replace_and_count() {
        let (_data_dir, dataset) = sample_dataset();
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("test.lance");

        let store = LanceVectorStore::open(&lance_path).await.unwrap();
        let manifest = IndexManifest::new(&dataset, "fake", DIM);

        // 빌드 전에는 테이블 없음
        assert!(store.count().await.is_err());

        let inserted = store
            .replace_all(&[entry(0, 0.1), entry(1, 0.2)], &manifest)
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().await.unwrap(), 2);

        // 덮어쓰기
        store
            .replace_all(&[entry(0, 0.1), entry(1, 0.2), entry(2, 0.3)], &manifest)
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.manifest().await.unwrap(), manifest);
    }

    #[tokio::test]
    async fn test_lance_search_orders_by_distance() {
        let (_data_dir, dataset) = sample_dataset();
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("search.lance");

        let store = LanceVectorStore::open(&lance_path).await.unwrap();
        let manifest = IndexManifest::new(&dataset, "fake", DIM);
        store
            .replace_all(
                &[entry(0, 0.0), entry(1, 1.0), entry(2, 0.5), entry(3, 3.0)],
                &manifest,
            )
            .await
            .unwrap();

        let results = store.search(&vec![0.9; DIM], 3).await.unwrap();
        let order: Vec<i64> = results.iter().map(|r| r.row_id).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!(results[0].distance < results[1].distance);
    }

    #[tokio::test]
    async fn test_lance_rejects_wrong_dimension() {
        let (_data_dir, dataset) = sample_dataset();
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("dim.lance"))
            .await
            .unwrap();
        let manifest = IndexManifest::new(&dataset, "fake", DIM + 1);

        assert!(store.replace_all(&[entry(0, 0.1)], &manifest).await.is_err());
    }

    #[tokio::test]
    async fn test_open_existing_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result = LanceVectorStore::open_existing(&temp_dir.path().join("none.lance")).await;
        let err = result.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<BookingError>(),
            Some(BookingError::NotFound(_))
        ));
    }
}
