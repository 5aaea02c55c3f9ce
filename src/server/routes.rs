//! 엔드포인트 핸들러

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::{ApiError, AppState};
use crate::analytics::AnalyticsReport;
use crate::index::{LanceVectorStore, VectorStore};

const QUERY_REQUIRED: &str = "query is required";

/// GET /health - 데이터 파일, 인덱스, 호스팅 모델 상태
///
/// 하위 점검이 실패해도 에러 대신 `"unhealthy"`를 보고합니다.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut healthy = true;

    let data = if state.config.data_path.exists() {
        "available"
    } else {
        healthy = false;
        "missing"
    };

    let index_check = match &state.answer {
        Some(answer) => answer.retriever().verify_index().await,
        None => index_readable(&state).await,
    };
    let index_ok = match index_check {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Index check failed: {:#}", e);
            false
        }
    };
    let faiss_index = if index_ok {
        "available"
    } else {
        healthy = false;
        "missing or corrupt"
    };

    let huggingface_api = match state.llm.check_available().await {
        Ok(()) => "available",
        Err(e) => {
            tracing::warn!("Hugging Face check failed: {:#}", e);
            healthy = false;
            "unavailable"
        }
    };

    Json(json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "data": data,
        "faiss_index": faiss_index,
        "huggingface_api": huggingface_api,
    }))
}

/// 데이터셋 없이 인덱스 디렉토리만 점검 (테이블과 매니페스트가 읽히는지)
async fn index_readable(state: &AppState) -> anyhow::Result<()> {
    let store = LanceVectorStore::open_existing(&state.config.index_path).await?;
    store.count().await?;
    store.manifest().await?;
    Ok(())
}

/// POST /analytics - 네 가지 분석 결과
pub async fn analytics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnalyticsReport>, ApiError> {
    let dataset = state.dataset()?;
    let report = AnalyticsReport::compute(dataset)?;
    Ok(Json(report))
}

/// POST /ask - `{query}`에 대한 RAG 답변
///
/// 본문은 Content-Type과 관계없이 JSON으로 해석합니다.
/// query가 없거나 비었거나 문자열이 아니면 (본문이 JSON이 아니어도)
/// 200과 함께 `{"error": "query is required"}`를 돌려주고 아무것도 호출하지 않습니다.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Some(query) = query_from_body(&body) else {
        return Ok(Json(json!({ "error": QUERY_REQUIRED })));
    };

    let answer = state.answer_service()?.answer(&query).await?;

    Ok(Json(json!({
        "query": query,
        "answer": answer,
    })))
}

/// 본문에서 비어 있지 않은 문자열 `query` 추출
fn query_from_body(body: &[u8]) -> Option<String> {
    let body: Value = serde_json::from_slice(body).ok()?;
    body.get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .map(str::to_string)
}
