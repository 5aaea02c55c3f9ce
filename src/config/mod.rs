//! 설정 모듈 - 환경변수 기반 런타임 설정
//!
//! `.env` 파일(현재 디렉토리, 없으면 `~/.config/booking-rag/.env`)을 먼저 읽고
//! 프로세스 환경변수로 덮어씁니다. CLI 플래그는 그 위에 적용됩니다.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// 환경변수 접두사
const ENV_PREFIX: &str = "BOOKING_RAG_";

/// Hugging Face 토큰 환경변수 (우선순위 순)
const TOKEN_VARS: [&str; 2] = ["HUGGINGFACE_TOKEN", "HF_TOKEN"];

pub const DEFAULT_DATA_PATH: &str = "data/cleaned_hotel_bookings.csv";
pub const DEFAULT_RAW_PATH: &str = "data/hotel_bookings.csv";
pub const DEFAULT_INDEX_PATH: &str = "models/bookings_index.lance";
pub const DEFAULT_CHAT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.3";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
/// hf-inference 프로바이더 라우터
pub const DEFAULT_HF_BASE_URL: &str = "https://router.huggingface.co/hf-inference";
/// 모델 메타데이터 조회용 Hub API
pub const DEFAULT_HF_HUB_URL: &str = "https://huggingface.co";
pub const DEFAULT_TOP_K: usize = 50;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 16_000;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// 런타임 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 정제된 데이터셋 CSV
    pub data_path: PathBuf,
    /// 원본 데이터셋 CSV (전처리 입력)
    pub raw_path: PathBuf,
    /// 유사도 인덱스 디렉토리
    pub index_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub chat_model: String,
    pub embedding_model: String,
    pub hf_base_url: String,
    pub hf_hub_url: String,
    /// 질의응답 시 검색할 레코드 수
    pub top_k: usize,
    pub max_tokens: u32,
    /// 컨텍스트 블롭 최대 길이 (문자 수)
    pub max_context_chars: usize,
    /// 호스팅 API 요청 타임아웃
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            raw_path: PathBuf::from(DEFAULT_RAW_PATH),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            host: "0.0.0.0".to_string(),
            port: 8000,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            hf_base_url: DEFAULT_HF_BASE_URL.to_string(),
            hf_hub_url: DEFAULT_HF_HUB_URL.to_string(),
            top_k: DEFAULT_TOP_K,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// `.env` 파일과 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        load_env_file();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 구성 (테스트에서 환경변수 대신 사용)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
        };

        let mut config = Self::default();

        if let Some(v) = get("DATA_PATH") {
            config.data_path = PathBuf::from(v);
        }
        if let Some(v) = get("RAW_PATH") {
            config.raw_path = PathBuf::from(v);
        }
        if let Some(v) = get("INDEX_PATH") {
            config.index_path = PathBuf::from(v);
        }
        if let Some(v) = get("HOST") {
            config.host = v;
        }
        if let Some(v) = get("PORT") {
            config.port = parse_var("PORT", &v)?;
        }
        if let Some(v) = get("CHAT_MODEL") {
            config.chat_model = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = get("HF_BASE_URL") {
            config.hf_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("HF_HUB_URL") {
            config.hf_hub_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("TOP_K") {
            config.top_k = parse_var("TOP_K", &v)?;
        }
        if let Some(v) = get("MAX_TOKENS") {
            config.max_tokens = parse_var("MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("MAX_CONTEXT_CHARS") {
            config.max_context_chars = parse_var("MAX_CONTEXT_CHARS", &v)?;
        }
        if let Some(v) = get("TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_var("TIMEOUT_SECS", &v)?);
        }

        if config.top_k == 0 {
            anyhow::bail!("{}TOP_K must be greater than 0", ENV_PREFIX);
        }

        Ok(config)
    }

    /// 서버 바인드 주소
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}{}: {:?}", ENV_PREFIX, name, value))
}

/// `.env` 파일 로드 (없으면 무시)
fn load_env_file() {
    if dotenv::dotenv().is_ok() {
        tracing::debug!("Loaded .env from working directory");
        return;
    }

    if let Some(path) = user_env_file() {
        if path.exists() && dotenv::from_path(&path).is_ok() {
            tracing::debug!("Loaded env file {:?}", path);
        }
    }
}

/// 사용자 설정 디렉토리의 env 파일 경로 (~/.config/booking-rag/.env)
pub fn user_env_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("booking-rag").join(".env"))
}

// ============================================================================
// API Token
// ============================================================================

/// Hugging Face 토큰 로드
///
/// 우선순위:
/// 1. `HUGGINGFACE_TOKEN` 환경변수
/// 2. `HF_TOKEN` 환경변수
pub fn get_api_token() -> Result<String> {
    for var in TOKEN_VARS {
        if let Ok(token) = std::env::var(var) {
            if !token.trim().is_empty() {
                tracing::debug!("Using API token from {}", var);
                return Ok(token);
            }
        }
    }

    anyhow::bail!(
        "HUGGINGFACE_TOKEN environment variable not set.\n\
         Set: export HUGGINGFACE_TOKEN=hf_...\n\
         Get a token at: https://huggingface.co/settings/tokens"
    )
}

/// 토큰 존재 여부 확인
pub fn has_api_token() -> bool {
    TOKEN_VARS.iter().any(|var| {
        std::env::var(var)
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    })
}

/// 경로 표시용 헬퍼 (존재 여부 포함)
pub fn describe_path(path: &Path) -> String {
    if path.exists() {
        format!("{}", path.display())
    } else {
        format!("{} (missing)", path.display())
    }
}

// ============================================================================
// Tests
// ============================================================================
