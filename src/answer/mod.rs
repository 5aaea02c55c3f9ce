//! Answer 모듈 - 검색 결과를 컨텍스트로 묶어 언어 모델에 질의
//!
//! 검색(top_k) → 레코드 직렬화 후 공백으로 연결 → 단일 턴 프롬프트 → 채팅 완성.
//! 컨텍스트 블롭은 문자 수 예산을 넘지 않도록 덜 비슷한 레코드부터 잘라냅니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::llm::{ChatMessage, LanguageModel};
use crate::retrieval::Retriever;

/// 프롬프트 마지막 지시문
const ANSWER_INSTRUCTION: &str =
    "Provide only the direct answer without explanation, calculations, or code:";

/// 답변과 부가 정보
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub answer: String,
    /// 검색된 레코드 수
    pub retrieved: usize,
    /// 컨텍스트에 실제로 들어간 레코드 수
    pub used_in_context: usize,
    pub context_chars: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// 질의응답 서비스
pub struct AnswerService {
    retriever: Arc<Retriever>,
    llm: Arc<dyn LanguageModel>,
    top_k: usize,
    max_tokens: u32,
    max_context_chars: usize,
}

impl AnswerService {
    pub fn new(retriever: Arc<Retriever>, llm: Arc<dyn LanguageModel>, config: &Config) -> Self {
        Self {
            retriever,
            llm,
            top_k: config.top_k,
            max_tokens: config.max_tokens,
            max_context_chars: config.max_context_chars,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// 질문에 대한 답변 텍스트
    pub async fn answer(&self, query: &str) -> Result<String> {
        Ok(self.answer_detailed(query).await?.answer)
    }

    /// 질문에 대한 답변 + 컨텍스트 통계
    pub async fn answer_detailed(&self, query: &str) -> Result<AnswerOutcome> {
        let start = Instant::now();

        let records = self.retriever.retrieve(query, self.top_k).await?;
        let dataset = self.retriever.dataset();
        let serialized: Vec<String> = records
            .iter()
            .map(|r| dataset.record_json(r.record).to_string())
            .collect();

        let (context, used_in_context) = build_context(&serialized, self.max_context_chars);
        if used_in_context < serialized.len() {
            tracing::warn!(
                "Context truncated to {} of {} records ({} chars)",
                used_in_context,
                serialized.len(),
                self.max_context_chars
            );
        }

        let messages = [ChatMessage::user(build_prompt(&context, query))];
        let answer = self.llm.complete(&messages, self.max_tokens).await?;

        let elapsed = start.elapsed();
        tracing::info!(
            "Answered with {} in {:.4} seconds ({} records)",
            self.llm.name(),
            elapsed.as_secs_f64(),
            used_in_context
        );

        Ok(AnswerOutcome {
            answer,
            retrieved: records.len(),
            used_in_context,
            context_chars: context.chars().count(),
            elapsed,
        })
    }
}

/// 레코드 문자열을 공백으로 연결하되 `max_chars`를 넘지 않게 함
///
/// 순서대로 통째로 넣고, 넘치는 첫 레코드부터 버립니다.
/// 첫 레코드 하나만으로 넘치면 예산 길이로 자릅니다.
/// 반환값: (컨텍스트, 포함된 레코드 수)
pub fn build_context(records: &[String], max_chars: usize) -> (String, usize) {
    let mut context = String::new();
    let mut used_chars = 0;
    let mut used = 0;

    for record in records {
        let record_chars = record.chars().count();
        let separator = usize::from(used > 0);

        if used_chars + separator + record_chars > max_chars {
            if used == 0 && max_chars > 0 {
                context = record.chars().take(max_chars).collect();
                used = 1;
            }
            break;
        }

        if separator == 1 {
            context.push(' ');
        }
        context.push_str(record);
        used_chars += separator + record_chars;
        used += 1;
    }

    (context, used)
}

/// 단일 턴 프롬프트
pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "Context: {}\n\nQuestion: {}\n{}",
        context, query, ANSWER_INSTRUCTION
    )
}

// ============================================================================
// Tests
// ============================================================================
