//! 에러 분류 - 호출자가 구분해야 하는 실패 유형
//!
//! 모듈 간 전파는 `anyhow::Result`로 하고, 분류가 필요한 실패만
//! `BookingError`로 만들어 `anyhow::Error` 안에 담습니다.
//! HTTP 계층에서 `downcast_ref`로 꺼내 상태 코드를 결정합니다.

use std::path::PathBuf;

use thiserror::Error;

/// 분류된 실패 유형
#[derive(Debug, Error)]
pub enum BookingError {
    /// 입력 파일 없음
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// 필수 컬럼/필드 누락 등 입력 검증 실패
    #[error("{0}")]
    Validation(String),

    /// 외부 호스팅 API 접근 불가 (네트워크, 인증, 모델 에러)
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    /// 인덱스가 현재 데이터셋/임베딩 모델과 맞지 않음
    #[error("similarity index does not match the dataset: {0}")]
    IndexMismatch(String),

    /// 빈 데이터셋에 대한 집계
    #[error("dataset is empty")]
    EmptyDataset,

    /// 파싱할 수 없는 셀
    #[error("malformed value {value:?} in column '{column}' at row {row}")]
    Malformed {
        row: usize,
        column: String,
        value: String,
    },
}

impl BookingError {
    /// 외부 서비스 실패 생성 헬퍼
    pub fn unavailable(service: &str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

/// anyhow 에러 체인에서 분류된 실패를 찾습니다.
pub fn classify(err: &anyhow::Error) -> Option<&BookingError> {
    err.chain().find_map(|cause| cause.downcast_ref::<BookingError>())
}
