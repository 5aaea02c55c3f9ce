//! Index Builder - 데이터셋 전체를 임베딩하여 유사도 인덱스 생성 (오프라인)

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::dataset::Dataset;
use crate::embedding::{EmbeddingProvider, DEFAULT_BATCH_SIZE};

use super::lance::LanceVectorStore;
use super::manifest::IndexManifest;
use super::vector::{VectorEntry, VectorStore};

/// 빌드 결과
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub vectors: usize,
    pub batches: usize,
    pub manifest: IndexManifest,
}

/// 인덱스 빌더
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// 배치 크기 지정 (최소 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 데이터셋의 모든 레코드를 요약/임베딩하여 저장소에 덮어씀
    ///
    /// 벡터 i는 데이터셋 행 i에 대응합니다.
    pub async fn build(&self, dataset: &Dataset, store: &dyn VectorStore) -> Result<BuildReport> {
        if dataset.is_empty() {
            anyhow::bail!("Cannot build an index from an empty dataset");
        }

        let summaries: Vec<String> = dataset.records().iter().map(|r| r.summary()).collect();
        let total_batches = summaries.len().div_ceil(self.batch_size);

        let mut entries = Vec::with_capacity(summaries.len());

        for (batch_no, chunk) in summaries.chunks(self.batch_size).enumerate() {
            tracing::debug!("Embedding batch {}/{}", batch_no + 1, total_batches);

            let embeddings = self
                .embedder
                .embed_batch(chunk)
                .await
                .with_context(|| format!("Failed to embed batch {}", batch_no + 1))?;

            if embeddings.len() != chunk.len() {
                anyhow::bail!(
                    "Embedder returned {} vectors for {} summaries",
                    embeddings.len(),
                    chunk.len()
                );
            }

            let offset = batch_no * self.batch_size;
            for (i, (summary, embedding)) in chunk.iter().zip(embeddings).enumerate() {
                entries.push(VectorEntry {
                    row_id: (offset + i) as i64,
                    summary: summary.clone(),
                    embedding,
                });
            }

            if (batch_no + 1) % 50 == 0 {
                tracing::info!("Embedded {}/{} records", entries.len(), summaries.len());
            }
        }

        let manifest =
            IndexManifest::new(dataset, self.embedder.name(), self.embedder.dimension());
        let vectors = store
            .replace_all(&entries, &manifest)
            .await
            .context("Failed to store vectors")?;

        tracing::info!("Index built: {} vectors", vectors);

        Ok(BuildReport {
            vectors,
            batches: total_batches,
            manifest,
        })
    }
}

/// 데이터셋 파일을 읽어 지정 경로에 인덱스 빌드
///
/// 데이터셋 파일이 없으면 `BookingError::NotFound`.
pub async fn build_index(
    data_path: &Path,
    index_path: &Path,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<BuildReport> {
    let dataset = Dataset::load(data_path)?;
    let store = LanceVectorStore::open(index_path).await?;

    let report = IndexBuilder::new(embedder).build(&dataset, &store).await?;
    tracing::info!("Similarity index saved to {:?}", index_path);

    Ok(report)
}
