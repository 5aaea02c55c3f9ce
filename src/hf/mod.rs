//! Hugging Face HTTP 클라이언트 - 임베딩/채팅 호출의 공통 기반
//!
//! 인증 헤더, 요청 타임아웃, 최소 호출 간격, 429/5xx 재시도(지수 백오프)를
//! 한 곳에서 처리합니다. 실패는 `BookingError::Unavailable`로 분류됩니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::BookingError;

/// 재시도 최대 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;
/// 호출 간 최소 딜레이 (ms)
const MIN_DELAY_MS: u64 = 100;

// ============================================================================
// Retry Policy
// ============================================================================

/// 재시도 정책
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// n번째 시도(0부터) 이후의 대기 시간
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }
}

/// 재시도 대상 상태 코드 (429, 5xx)
fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// 호출 간 최소 간격 보장
#[derive(Debug)]
struct RateLimiter {
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능 시점까지 대기
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

// ============================================================================
// HfClient
// ============================================================================

/// Hugging Face API 에러 응답 (`{"error": "..."}`)
#[derive(Debug, Deserialize)]
struct HfError {
    error: serde_json::Value,
}

/// Hugging Face 공통 HTTP 클라이언트
#[derive(Debug, Clone)]
pub struct HfClient {
    token: String,
    base_url: String,
    hub_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl HfClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `token` - Hugging Face 액세스 토큰
    /// * `base_url` - 추론 라우터 주소 (예: `https://router.huggingface.co/hf-inference`)
    /// * `hub_url` - Hub API 주소 (예: `https://huggingface.co`)
    /// * `timeout` - 요청 타임아웃
    pub fn new(token: String, base_url: &str, hub_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("booking-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            hub_url: hub_url.trim_end_matches('/').to_string(),
            client,
            retry: RetryPolicy::default(),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(Duration::from_millis(
                MIN_DELAY_MS,
            )))),
        })
    }

    /// 설정과 환경변수 토큰으로 생성
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = crate::config::get_api_token()?;
        Self::new(
            token,
            &config.hf_base_url,
            &config.hf_hub_url,
            config.request_timeout,
        )
    }

    /// 재시도 정책 교체
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 모델 추론 엔드포인트 URL
    pub fn model_url(&self, model: &str, suffix: &str) -> String {
        format!("{}/models/{}/{}", self.base_url, model, suffix.trim_start_matches('/'))
    }

    /// JSON POST (재시도 포함) 후 응답 본문 반환
    ///
    /// 전송 실패, 429, 5xx는 지수 백오프로 재시도하고
    /// 그 외 실패 상태는 즉시 `Unavailable`로 반환합니다.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        service: &str,
        url: &str,
        body: &T,
    ) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 0..=self.retry.max_retries {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let response = match self
                .client
                .post(url)
                .bearer_auth(&self.token)
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = format!("request failed: {}", e);
                    if attempt < self.retry.max_retries {
                        let backoff = self.retry.backoff(attempt);
                        tracing::warn!(
                            "{} request failed, retrying in {:?} (attempt {}/{})",
                            service,
                            backoff,
                            attempt + 1,
                            self.retry.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let text = response.text().await.map_err(|e| {
                BookingError::unavailable(service, format!("failed to read response body: {}", e))
            })?;

            if status.is_success() {
                return Ok(text);
            }

            let message = error_message(&text);
            if is_retryable(status) {
                last_error = format!("HTTP {}: {}", status, message);
                if attempt < self.retry.max_retries {
                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(
                        "{} returned {}, backing off {:?} (attempt {}/{})",
                        service,
                        status,
                        backoff,
                        attempt + 1,
                        self.retry.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                return Err(
                    BookingError::unavailable(service, format!("HTTP {}: {}", status, message))
                        .into(),
                );
            }
        }

        Err(BookingError::unavailable(
            service,
            format!(
                "giving up after {} retries: {}",
                self.retry.max_retries, last_error
            ),
        )
        .into())
    }

    /// Hub에서 모델 메타데이터 조회 (가용성 확인용)
    pub async fn model_info(&self, model: &str) -> Result<serde_json::Value> {
        let url = format!("{}/api/models/{}", self.hub_url, model);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BookingError::unavailable("huggingface hub", e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BookingError::unavailable("huggingface hub", e.to_string()))?;

        if !status.is_success() {
            return Err(BookingError::unavailable(
                "huggingface hub",
                format!("HTTP {}: {}", status, error_message(&text)),
            )
            .into());
        }

        serde_json::from_str(&text).context("Failed to parse model info response")
    }
}

/// 에러 본문에서 사람이 읽을 메시지 추출
fn error_message(body: &str) -> String {
    match serde_json::from_str::<HfError>(body) {
        Ok(HfError {
            error: serde_json::Value::String(s),
        }) => s,
        Ok(HfError { error }) => error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        Err(_) => body.chars().take(200).collect(),
    }
}

// ============================================================================
// Tests
// ============================================================================
