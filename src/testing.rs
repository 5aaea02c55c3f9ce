//! 테스트 공용 픽스처 - 샘플 데이터셋과 가짜 임베딩/저장소/언어 모델

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use crate::answer::AnswerService;
use crate::config::Config;
use crate::dataset::Dataset;
use crate::embedding::EmbeddingProvider;
use crate::error::BookingError;
use crate::index::{
    l2_distance, sort_by_distance, IndexBuilder, IndexManifest, SearchResult, VectorEntry,
    VectorStore,
};
use crate::llm::{ChatMessage, LanguageModel};
use crate::retrieval::Retriever;

pub const SAMPLE_HEADER: &str = "hotel,\
    is_canceled,lead_time,stays_in_weekend_nights,stays_in_week_nights,adr,country,reservation_status_date";

/// 10건, 취소 3건, 2017년 1~4월
const SAMPLE_ROWS: [&str; 10] = [
    "City Hotel,1,10,0,2,100,PRT,2017-01-05",
    "Resort Hotel,0,20,1,1,50,GBR,2017-01-06",
    "City Hotel,0,30,0,1,80,PRT,2017-02-01",
    "Resort Hotel,1,40,2,0,120,ESP,2017-02-02",
    "City Hotel,0,50,1,2,90,FRA,2017-02-03",
    "Resort Hotel,0,60,0,3,70,PRT,2017-03-10",
    "City Hotel,1,70,1,0,60,DEU,2017-03-11",
    "Resort Hotel,0,80,0,1,110,GBR,2017-03-12",
    "City Hotel,0,90,2,2,95,ITA,2017-04-01",
    "Resort Hotel,0,100,0,2,85,PRT,2017-04-02",
];

/// 주어진 행으로 CSV를 만들어 로드
pub fn dataset_from_rows(rows: &[&str]) -> (TempDir, Dataset) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cleaned_hotel_bookings.csv");

    let mut content = String::from(SAMPLE_HEADER);
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    std::fs::write(&path, content).unwrap();

    let dataset = Dataset::load(&path).unwrap();
    (dir, dataset)
}

/// 표준 샘플 데이터셋
pub fn sample_dataset() -> (TempDir, Dataset) {
    dataset_from_rows(&SAMPLE_ROWS)
}

// ============================================================================
// FakeEmbedder
// ============================================================================

/// 결정적 해시 임베딩 (같은 텍스트 → 같은 벡터)
#[derive(Debug, Default)]
pub struct FakeEmbedder {
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub const DIMENSION: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// embed/embed_batch 호출 횟수
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; Self::DIMENSION];
        let bytes = text.as_bytes();
        for window in bytes.windows(3) {
            let hash = window
                .iter()
                .fold(17usize, |acc, &b| acc.wrapping_mul(31).wrapping_add(b as usize));
            v[hash % Self::DIMENSION] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn name(&self) -> &str {
        "fake-hash-embedding"
    }
}

// ============================================================================
// MemoryVectorStore
// ============================================================================

/// 메모리 내 전수 L2 검색 저장소
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    state: Mutex<Option<(Vec<VectorEntry>, IndexManifest)>>,
}

impl MemoryVectorStore {
    pub fn entries(&self) -> Vec<VectorEntry> {
        self.state
            .lock()
            .unwrap()
            .as_ref()
            .map(|(entries, _)| entries.clone())
            .unwrap_or_default()
    }

    fn missing() -> anyhow::Error {
        BookingError::NotFound("memory://index".into()).into()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn replace_all(
        &self,
        entries: &[VectorEntry],
        manifest: &IndexManifest,
    ) -> Result<usize> {
        *self.state.lock().unwrap() = Some((entries.to_vec(), manifest.clone()));
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let state = self.state.lock().unwrap();
        let (entries, _) = state.as_ref().ok_or_else(Self::missing)?;

        let mut results: Vec<SearchResult> = entries
            .iter()
            .map(|e| SearchResult {
                row_id: e.row_id,
                summary: e.summary.clone(),
                distance: l2_distance(query_embedding, &e.embedding),
            })
            .collect();
        sort_by_distance(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let state = self.state.lock().unwrap();
        state
            .as_ref()
            .map(|(entries, _)| entries.len())
            .ok_or_else(Self::missing)
    }

    async fn manifest(&self) -> Result<IndexManifest> {
        let state = self.state.lock().unwrap();
        state
            .as_ref()
            .map(|(_, manifest)| manifest.clone())
            .ok_or_else(Self::missing)
    }
}

// ============================================================================
// FakeLanguageModel
// ============================================================================

/// 고정 답변 (또는 실패)을 돌려주고 받은 프롬프트를 기록
#[derive(Debug, Default)]
pub struct FakeLanguageModel {
    answer: Option<String>,
    available: bool,
    prompts: Mutex<Vec<String>>,
    max_tokens: Mutex<Option<u32>>,
}

impl FakeLanguageModel {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            available: true,
            ..Default::default()
        }
    }

    /// 항상 Unavailable로 실패
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_max_tokens(&self) -> Option<u32> {
        *self.max_tokens.lock().unwrap()
    }
}

#[async_trait]
impl LanguageModel for FakeLanguageModel {
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .extend(messages.iter().map(|m| m.content.clone()));
        *self.max_tokens.lock().unwrap() = Some(max_tokens);

        self.answer
            .clone()
            .ok_or_else(|| BookingError::unavailable("language model", "fake outage").into())
    }

    async fn check_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(BookingError::unavailable("huggingface hub", "fake outage").into())
        }
    }

    fn name(&self) -> &str {
        "fake-chat"
    }
}

// ============================================================================
// Composed Services
// ============================================================================

/// 주어진 데이터셋으로 메모리 인덱스를 빌드한 Retriever
pub async fn indexed_retriever(
    dataset: Arc<Dataset>,
    embedder: Arc<FakeEmbedder>,
) -> Arc<Retriever> {
    let store = Arc::new(MemoryVectorStore::default());

    IndexBuilder::new(embedder.clone())
        .build(&dataset, store.as_ref())
        .await
        .unwrap();

    Arc::new(Retriever::new(dataset, store, embedder))
}

/// 샘플 데이터셋 위에 인덱스를 빌드한 Retriever
pub async fn built_retriever(embedder: Arc<FakeEmbedder>) -> (TempDir, Arc<Retriever>) {
    let (dir, dataset) = sample_dataset();
    (dir, indexed_retriever(Arc::new(dataset), embedder).await)
}

/// 가짜 모델을 연결한 AnswerService
pub async fn built_answer_service(
    llm: Arc<FakeLanguageModel>,
    top_k: usize,
    max_context_chars: usize,
) -> (TempDir, AnswerService) {
    let (dir, retriever) = built_retriever(Arc::new(FakeEmbedder::new())).await;
    let config = Config {
        top_k,
        max_context_chars,
        ..Config::default()
    };

    (dir, AnswerService::new(retriever, llm, &config))
}
