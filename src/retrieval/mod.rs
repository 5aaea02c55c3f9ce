//! Retrieval 모듈 - 질의와 가장 비슷한 예약 레코드 검색
//!
//! 질의 임베딩 → L2 k-NN 검색 → 행 순번으로 데이터셋 레코드 매핑.
//! 점수 임계값이나 중복 제거 없이 항상 최대 `top_k`개를 가까운 순으로 반환합니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::dataset::{BookingRecord, Dataset};
use crate::embedding::EmbeddingProvider;
use crate::error::BookingError;
use crate::index::VectorStore;

/// 검색된 레코드
#[derive(Debug, Clone)]
pub struct RetrievedRecord<'a> {
    /// 데이터셋 행 순번
    pub row: usize,
    pub record: &'a BookingRecord,
    /// 질의와의 L2 거리
    pub distance: f32,
}

/// 검색 서비스
///
/// 데이터셋, 인덱스, 임베딩 프로바이더는 시작 시 한 번 만들어 주입합니다.
pub struct Retriever {
    dataset: Arc<Dataset>,
    index: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(
        dataset: Arc<Dataset>,
        index: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            dataset,
            index,
            embedder,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// 인덱스가 현재 데이터셋/임베딩 모델로 만들어졌는지 확인
    pub async fn verify_index(&self) -> Result<()> {
        let manifest = self
            .index
            .manifest()
            .await
            .context("Failed to load index manifest")?;
        manifest.verify(
            &self.dataset,
            self.embedder.name(),
            self.embedder.dimension(),
        )
    }

    /// 질의와 가장 비슷한 레코드 최대 `top_k`개 (가까운 순)
    ///
    /// # Errors
    /// * `BookingError::Validation` - 빈 질의
    /// * `BookingError::NotFound` - 인덱스 없음
    /// * `BookingError::IndexMismatch` - 인덱스가 데이터셋과 맞지 않음
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedRecord<'_>>> {
        if query.trim().is_empty() {
            return Err(BookingError::Validation("query must not be empty".to_string()).into());
        }

        self.verify_index().await?;

        if top_k == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let hits = self
            .index
            .search(&query_embedding, top_k)
            .await
            .context("Vector search failed")?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let record = usize::try_from(hit.row_id)
                .ok()
                .and_then(|row| self.dataset.get(row).map(|record| (row, record)));

            let Some((row, record)) = record else {
                return Err(BookingError::IndexMismatch(format!(
                    "index returned row {} but dataset has {} rows",
                    hit.row_id,
                    self.dataset.len()
                ))
                .into());
            };

            results.push(RetrievedRecord {
                row,
                record,
                distance: hit.distance,
            });
        }

        tracing::debug!("Retrieved {} records for query {:?}", results.len(), query);

        Ok(results)
    }
}
