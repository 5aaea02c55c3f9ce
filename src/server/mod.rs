//! HTTP 서버 - 헬스 체크, 분석, 질의응답 엔드포인트
//!
//! 데이터셋, 인덱스, 호스팅 모델 클라이언트는 시작 시 한 번 만들어
//! `AppState`로 모든 핸들러에 공유합니다. 요청 간 공유 상태는 읽기 전용입니다.

mod routes;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::answer::AnswerService;
use crate::config::Config;
use crate::dataset::Dataset;
use crate::embedding::create_embedder;
use crate::error::{classify, BookingError};
use crate::index::LanceVectorStore;
use crate::llm::{HuggingFaceChat, LanguageModel};
use crate::retrieval::Retriever;

// ============================================================================
// Shared State
// ============================================================================

/// 핸들러 공유 상태
///
/// 데이터셋이나 인덱스가 없어도 서버는 뜨고, `/health`가 이를 보고합니다.
pub struct AppState {
    pub config: Config,
    pub dataset: Option<Arc<Dataset>>,
    pub answer: Option<Arc<AnswerService>>,
    pub llm: Arc<dyn LanguageModel>,
}

impl AppState {
    /// 설정에 따라 데이터셋, 인덱스, 모델 클라이언트를 준비
    ///
    /// 토큰이 없으면 실패합니다. 데이터셋/인덱스 로드 실패는 경고만 남깁니다.
    pub async fn load(config: Config) -> Result<Self> {
        let llm: Arc<dyn LanguageModel> = Arc::new(HuggingFaceChat::from_config(&config)?);
        let embedder = Arc::new(create_embedder(&config)?);

        let dataset = match Dataset::load(&config.data_path) {
            Ok(dataset) => {
                tracing::info!("Loaded {} bookings from {:?}", dataset.len(), config.data_path);
                Some(Arc::new(dataset))
            }
            Err(e) => {
                tracing::warn!("Dataset unavailable: {:#}", e);
                None
            }
        };

        let answer = match &dataset {
            Some(dataset) => match LanceVectorStore::open_existing(&config.index_path).await {
                Ok(store) => {
                    let retriever = Retriever::new(dataset.clone(), Arc::new(store), embedder);
                    if let Err(e) = retriever.verify_index().await {
                        tracing::warn!("Similarity index not usable: {:#}", e);
                    }
                    Some(Arc::new(AnswerService::new(
                        Arc::new(retriever),
                        llm.clone(),
                        &config,
                    )))
                }
                Err(e) => {
                    tracing::warn!("Similarity index unavailable: {:#}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            config,
            dataset,
            answer,
            llm,
        })
    }

    fn dataset(&self) -> Result<&Arc<Dataset>> {
        self.dataset
            .as_ref()
            .ok_or_else(|| BookingError::NotFound(self.config.data_path.clone()).into())
    }

    fn answer_service(&self) -> Result<&Arc<AnswerService>> {
        let missing: &Path = if self.dataset.is_none() {
            &self.config.data_path
        } else {
            &self.config.index_path
        };
        self.answer
            .as_ref()
            .ok_or_else(|| BookingError::NotFound(missing.to_path_buf()).into())
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// 핸들러 에러 - `{"error": ...}` JSON과 분류별 상태 코드로 변환
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match classify(&self.0) {
            Some(BookingError::Unavailable { .. }) => StatusCode::BAD_GATEWAY,
            Some(BookingError::IndexMismatch(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!("Request failed ({}): {:#}", status, self.0);

        let body = serde_json::json!({ "error": format!("{:#}", self.0) });
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// 라우터 구성
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/analytics", post(routes::analytics))
        .route("/ask", post(routes::ask))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 서버 실행 (종료될 때까지 대기)
pub async fn serve(config: Config) -> Result<()> {
    let addr = config.bind_addr();
    let state = Arc::new(AppState::load(config).await?);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::embedding::EmbeddingProvider;
    use crate::index::{IndexManifest, VectorEntry, VectorStore};
    use crate::testing::{indexed_retriever, sample_dataset, FakeEmbedder, FakeLanguageModel};

    struct Harness {
        _dir: tempfile::TempDir,
        embedder: Arc<FakeEmbedder>,
        llm: Arc<FakeLanguageModel>,
        state: Arc<AppState>,
    }

    async fn harness(llm: FakeLanguageModel) -> Harness {
        let (dir, dataset) = sample_dataset();
        let dataset = Arc::new(dataset);
        let embedder = Arc::new(FakeEmbedder::new());
        let llm = Arc::new(llm);

        let retriever = indexed_retriever(dataset.clone(), embedder.clone()).await;
        let config = Config {
            data_path: dataset.path().to_path_buf(),
            top_k: 3,
            ..Config::default()
        };
        let answer = AnswerService::new(retriever, llm.clone(), &config);

        let state = Arc::new(AppState {
            config,
            dataset: Some(dataset),
            answer: Some(Arc::new(answer)),
            llm: llm.clone(),
        });

        Harness {
            _dir: dir,
            embedder,
            llm,
            state,
        }
    }

    async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_raw(uri: &str, content_type: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_all_available() {
        let h = harness(FakeLanguageModel::answering("ok")).await;
        let (status, body) = send(h.state, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["data"], "available");
        assert_eq!(body["faiss_index"], "available");
        assert_eq!(body["huggingface_api"], "available");
    }

    #[tokio::test]
    async fn test_health_unhealthy_without_data() {
        let state = Arc::new(AppState {
            config: Config {
                data_path: "/nonexistent/cleaned_hotel_bookings.csv".into(),
                ..Config::default()
            },
            dataset: None,
            answer: None,
            llm: Arc::new(FakeLanguageModel::answering("ok")),
        });

        let (status, body) = send(state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["data"], "missing");
        assert_eq!(body["faiss_index"], "missing or corrupt");
        assert_eq!(body["huggingface_api"], "available");
    }

    #[tokio::test]
    async fn test_health_reports_model_outage() {
        let h = harness(FakeLanguageModel::failing()).await;
        let (status, body) = send(h.state, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["huggingface_api"], "unavailable");
    }

    #[tokio::test]
    async fn test_ask_without_query_makes_no_calls() {
        let h = harness(FakeLanguageModel::answering("Portugal")).await;
        let calls_after_build = h.embedder.calls();

        for body in [r#"{}"#, r#"{"query": ""}"#, r#"{"query": 42}"#, "not json"] {
            let (status, json) = send(h.state.clone(), post_json("/ask", body)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json, serde_json::json!({"error": "query is required"}));
        }

        assert_eq!(h.embedder.calls(), calls_after_build);
        assert!(h.llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_ask_returns_answer() {
        let h = harness(FakeLanguageModel::answering("Portugal")).await;
        let (status, body) = send(
            h.state,
            post_json("/ask", r#"{"query": "Which country has the most bookings?"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "Which country has the most bookings?");
        assert_eq!(body["answer"], "Portugal");
        assert_eq!(h.llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_ask_model_outage_is_bad_gateway() {
        let h = harness(FakeLanguageModel::failing()).await;
        let (status, body) = send(h.state, post_json("/ask", r#"{"query": "anything"}"#)).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_analytics() {
        let h = harness(FakeLanguageModel::answering("ok")).await;
        let (status, body) = send(h.state, post_json("/analytics", "")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancellation_rate"], 30.0);
        assert_eq!(body["revenue_trends"].as_array().unwrap().len(), 4);
        assert_eq!(body["geographical_distribution"][0]["country"], "PRT");
        assert_eq!(
            body["lead_time_distribution"]["bins"].as_array().unwrap().len(),
            50
        );
    }

    #[tokio::test]
    async fn test_analytics_without_data_is_error() {
        let state = Arc::new(AppState {
            config: Config::default(),
            dataset: None,
            answer: None,
            llm: Arc::new(FakeLanguageModel::answering("ok")),
        });

        let (status, body) = send(state, post_json("/analytics", "")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_ask_parses_body_regardless_of_content_type() {
        let h = harness(FakeLanguageModel::answering("Portugal")).await;
        let body = r#"{"query": "Which country books most?"}"#;

        let content_types = [
            None,
            Some("application/x-www-form-urlencoded"),
            Some("text/plain"),
        ];
        for content_type in content_types {
            let (status, json) =
                send(h.state.clone(), post_raw("/ask", content_type, body)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["answer"], "Portugal");
            assert_eq!(json["query"], "Which country books most?");
        }

        assert_eq!(h.llm.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_health_checks_index_without_dataset() {
        let (_data_dir, dataset) = sample_dataset();
        let index_dir = tempfile::TempDir::new().unwrap();
        let index_path = index_dir.path().join("bookings_index.lance");

        let embedder = FakeEmbedder::new();
        let store = LanceVectorStore::open(&index_path).await.unwrap();
        let manifest = IndexManifest::new(&dataset, embedder.name(), embedder.dimension());
        let entry = VectorEntry {
            row_id: 0,
            summary: "booking".to_string(),
            embedding: vec![0.5; embedder.dimension()],
        };
        store.replace_all(&[entry], &manifest).await.unwrap();

        let state = Arc::new(AppState {
            config: Config {
                data_path: "/nonexistent/cleaned_hotel_bookings.csv".into(),
                index_path: index_path.clone(),
                ..Config::default()
            },
            dataset: None,
            answer: None,
            llm: Arc::new(FakeLanguageModel::answering("ok")),
        });

        let (_, body) = send(state, get("/health")).await;
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["data"], "missing");
        assert_eq!(body["faiss_index"], "available");
    }
}
