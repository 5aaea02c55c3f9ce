//! booking-rag - 호텔 예약 분석 및 RAG 질의응답 서비스
//!
//! 정제된 호텔 예약 CSV를 메모리에 올려 집계 분석을 제공하고,
//! 레코드 요약 임베딩(LanceDB) 검색 결과를 컨텍스트로
//! 호스팅된 언어 모델에 질문하는 HTTP 서비스입니다.

pub mod analytics;
pub mod answer;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod hf;
pub mod index;
pub mod llm;
pub mod retrieval;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use analytics::AnalyticsReport;
pub use answer::{AnswerOutcome, AnswerService};
pub use config::{get_api_token, has_api_token, Config};
pub use dataset::{BookingRecord, Dataset};
pub use embedding::{create_embedder, EmbeddingProvider, HuggingFaceEmbedding};
pub use error::BookingError;
pub use index::{build_index, IndexManifest, LanceVectorStore, SearchResult, VectorStore};
pub use llm::{HuggingFaceChat, LanguageModel};
pub use retrieval::{RetrievedRecord, Retriever};
