//! Index 모듈 - 예약 요약 임베딩의 유사도 인덱스
//!
//! - Vector: 저장소 트레이트 + L2 거리 유틸리티
//! - Lance: LanceDB 기반 영속 저장소
//! - Manifest: 인덱스와 데이터셋의 정렬 검증
//! - Builder: 오프라인 인덱스 빌드

mod builder;
mod lance;
mod manifest;
mod vector;

// Re-exports
pub use builder::{build_index, BuildReport, IndexBuilder};
pub use lance::LanceVectorStore;
pub use manifest::{IndexManifest, MANIFEST_FILE};
pub use vector::{l2_distance, sort_by_distance, SearchResult, VectorEntry, VectorStore};
