//! 임베딩 모듈 - Hugging Face feature-extraction을 통한 텍스트 벡터화
//!
//! 인덱스 빌드와 질의 시점 모두 같은 모델을 써야 거리가 의미를 가집니다.
//! 모델 이름은 인덱스 매니페스트에 기록되어 검색 전에 대조됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config)?;
//! let embedding = embedder.embed("booking on 2017-08-01 at City Hotel").await?;
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::BookingError;
use crate::hf::HfClient;

/// all-MiniLM-L6-v2 출력 차원
pub const DEFAULT_DIMENSION: usize = 384;

/// 배치 한 번에 보내는 최대 텍스트 수
pub const DEFAULT_BATCH_SIZE: usize = 64;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더(모델) 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Hugging Face Embedding
// ============================================================================

/// feature-extraction 파이프라인 요청 본문
#[derive(Debug, Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
}

/// Hugging Face 추론 API 기반 문장 임베딩
#[derive(Debug, Clone)]
pub struct HuggingFaceEmbedding {
    client: HfClient,
    model: String,
    dimension: usize,
}

impl HuggingFaceEmbedding {
    /// 새 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `client` - 공통 HTTP 클라이언트
    /// * `model` - 문장 임베딩 모델 ID
    /// * `dimension` - 모델 출력 차원
    pub fn new(client: HfClient, model: impl Into<String>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Invalid dimension: 0");
        }

        Ok(Self {
            client,
            model: model.into(),
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        self.client
            .model_url(&self.model, "pipeline/feature-extraction")
    }

    /// 응답 파싱 및 차원 검증
    fn parse_response(&self, body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
        let vectors: Vec<Vec<f32>> =
            serde_json::from_str(body).context("Failed to parse embedding response")?;

        if vectors.len() != expected {
            return Err(BookingError::unavailable(
                "embedding",
                format!("expected {} vectors, got {}", expected, vectors.len()),
            )
            .into());
        }

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(BookingError::unavailable(
                "embedding",
                format!(
                    "model {} returned dimension {}, expected {}",
                    self.model,
                    bad.len(),
                    self.dimension
                ),
            )
            .into());
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = FeatureExtractionRequest { inputs: texts };
        let body = self
            .client
            .post_json("embedding", &self.endpoint(), &request)
            .await?;

        self.parse_response(&body, texts.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정 기반 임베딩 프로바이더 생성
///
/// 환경변수의 토큰이 없으면 실패합니다.
pub fn create_embedder(config: &Config) -> Result<HuggingFaceEmbedding> {
    let client = HfClient::from_config(config)?;
    let embedder =
        HuggingFaceEmbedding::new(client, config.embedding_model.clone(), DEFAULT_DIMENSION)?;
    tracing::info!(
        "Using Hugging Face embedding {} (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hf::RetryPolicy;
    use mockito::Server;
    use std::time::Duration;

    fn embedder_for(url: &str, dimension: usize) -> HuggingFaceEmbedding {
        let client = HfClient::new("hf_test".to_string(), url, url, Duration::from_secs(5))
            .unwrap()
            .with_retry(RetryPolicy {
                max_retries: 0,
                initial_backoff: Duration::from_millis(1),
            });
        HuggingFaceEmbedding::new(client, "org/mini", dimension).unwrap()
    }

    #[test]
    fn test_invalid_dimension() {
        let client =
            HfClient::new("t".to_string(), "http://x", "http://x", Duration::from_secs(1)).unwrap();
        let result = HuggingFaceEmbedding::new(client, "org/mini", 0);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/models/org/mini/pipeline/feature-extraction")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "inputs": ["a", "b"]
            })))
            .with_status(200)
            .with_body("[[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]")
            .create_async()
            .await;

        let embedder = embedder_for(&server.url(), 3);
        let vectors = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn test_embed_rejects_wrong_dimension() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/org/mini/pipeline/feature-extraction")
            .with_status(200)
            .with_body("[[0.1, 0.2]]")
            .create_async()
            .await;

        let embedder = embedder_for(&server.url(), 3);
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("dimension 2"));
    }

    #[tokio::test]
    async fn test_embed_empty_text_skips_request() {
        // 서버 없이도 동작해야 함
        let embedder = embedder_for("http://127.0.0.1:9", 4);
        let vector = embedder.embed("   ").await.unwrap();
        assert_eq!(vector, vec![0.0; 4]);
    }

    #[test]
    fn test_create_embedder_without_token_returns_error() {
        std::env::remove_var("HUGGINGFACE_TOKEN");
        std::env::remove_var("HF_TOKEN");

        let config = Config::default();
        assert!(create_embedder(&config).is_err());
    }
}
