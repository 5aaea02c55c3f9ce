//! LLM 모듈 - 호스팅된 채팅 완성 API 호출
//!
//! OpenAI 호환 `/v1/chat/completions` 엔드포인트에 단일 턴 요청을 보내고
//! 첫 번째 선택지의 텍스트를 반환합니다. 스트리밍은 사용하지 않습니다.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::BookingError;
use crate::hf::HfClient;

// ============================================================================
// Types
// ============================================================================

/// 채팅 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 채팅 완성 (응답 텍스트 반환)
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String>;

    /// 모델 가용성 확인
    async fn check_available(&self) -> Result<()>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Hugging Face Chat
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Hugging Face 추론 API 기반 채팅 모델
#[derive(Debug, Clone)]
pub struct HuggingFaceChat {
    client: HfClient,
    model: String,
}

impl HuggingFaceChat {
    pub fn new(client: HfClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// 설정 기반 생성 (토큰 없으면 실패)
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = HfClient::from_config(config)?;
        Ok(Self::new(client, config.chat_model.clone()))
    }
}

#[async_trait]
impl LanguageModel for HuggingFaceChat {
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens,
            stream: false,
        };

        let url = self.client.model_url(&self.model, "v1/chat/completions");
        let body = self.client.post_json("language model", &url, &request).await?;

        let response: ChatCompletionResponse =
            serde_json::from_str(&body).context("Failed to parse chat completion response")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                BookingError::unavailable("language model", "response contained no choices")
                    .into()
            })
    }

    async fn check_available(&self) -> Result<()> {
        self.client.model_info(&self.model).await.map(|_| ())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
