//! 인덱스 매니페스트 - 인덱스가 어떤 데이터셋/모델로 만들어졌는지 기록
//!
//! 벡터 순번은 데이터셋 행 순번과 1:1로 대응해야 합니다.
//! 검색 전에 행 수, 파일 지문, 모델 이름, 차원을 대조하고
//! 하나라도 다르면 검색을 거부합니다.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::BookingError;

/// 매니페스트 파일 이름
pub const MANIFEST_FILE: &str = "manifest.json";

/// 인덱스 매니페스트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub row_count: usize,
    /// 데이터셋 파일 SHA-256
    pub dataset_fingerprint: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
}

impl IndexManifest {
    /// 현재 데이터셋과 모델로 매니페스트 생성
    pub fn new(dataset: &Dataset, embedding_model: &str, dimension: usize) -> Self {
        Self {
            row_count: dataset.len(),
            dataset_fingerprint: dataset.fingerprint().to_string(),
            embedding_model: embedding_model.to_string(),
            dimension,
            built_at: Utc::now(),
        }
    }

    /// 데이터셋/모델과 일치하는지 검증
    pub fn verify(&self, dataset: &Dataset, embedding_model: &str, dimension: usize) -> Result<()> {
        if self.row_count != dataset.len() {
            return Err(BookingError::IndexMismatch(format!(
                "index has {} rows, dataset has {}",
                self.row_count,
                dataset.len()
            ))
            .into());
        }

        if self.dataset_fingerprint != dataset.fingerprint() {
            return Err(BookingError::IndexMismatch(
                "dataset file changed since the index was built".to_string(),
            )
            .into());
        }

        if self.embedding_model != embedding_model || self.dimension != dimension {
            return Err(BookingError::IndexMismatch(format!(
                "index built with {} ({}d), query embedder is {} ({}d)",
                self.embedding_model, self.dimension, embedding_model, dimension
            ))
            .into());
        }

        Ok(())
    }

    /// 디렉토리에서 매니페스트 읽기
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(BookingError::NotFound(path).into());
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse manifest: {:?}", path))
    }

    /// 디렉토리에 매니페스트 쓰기 (덮어쓰기)
    pub fn write(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).context("Failed to create index directory")?;
        let text = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        std::fs::write(dir.join(MANIFEST_FILE), text).context("Failed to write manifest")
    }
}
