//! Vector Store - 벡터 검색 트레이트 및 유틸리티
//!
//! 모든 거리는 유클리드(L2) 거리이며, 작을수록 가깝습니다.

use anyhow::Result;
use async_trait::async_trait;

use super::manifest::IndexManifest;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 데이터셋 행 순번 (0-based)
    pub row_id: i64,
    /// 임베딩한 요약 텍스트
    pub summary: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// 데이터셋 행 순번
    pub row_id: i64,
    /// 요약 텍스트
    pub summary: String,
    /// L2 거리 (0.0 = 동일)
    pub distance: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 유사도 인덱스 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 기존 내용을 모두 지우고 엔트리와 매니페스트를 저장
    async fn replace_all(&self, entries: &[VectorEntry], manifest: &IndexManifest)
        -> Result<usize>;

    /// k-최근접 이웃 검색 (가까운 순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 저장된 매니페스트 조회
    async fn manifest(&self) -> Result<IndexManifest>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 유클리드(L2) 거리
///
/// 길이가 다르면 `f32::INFINITY`를 반환합니다.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// 거리 오름차순, 같은 거리는 행 순번 오름차순으로 정렬
pub fn sort_by_distance(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.row_id.cmp(&b.row_id))
    });
}

// ============================================================================
// Tests
// ============================================================================
