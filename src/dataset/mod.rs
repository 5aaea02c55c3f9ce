//! Dataset 모듈 - 정제된 호텔 예약 CSV 로드
//!
//! 프로세스 시작 시 한 번 메모리에 올리고 이후에는 읽기 전용으로 공유합니다.
//! 분석과 요약 생성에 쓰는 컬럼은 타입을 갖춘 필드로, 나머지 컬럼은
//! 원본 문자열 그대로 보관합니다.

pub mod preprocess;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::error::BookingError;

pub use preprocess::{preprocess, PreprocessReport};

/// 날짜/시간으로 파싱하는 컬럼
pub const DATE_COLUMN: &str = "reservation_status_date";

/// 로드 시 반드시 있어야 하는 컬럼
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "hotel",
    "is_canceled",
    "lead_time",
    "stays_in_weekend_nights",
    "stays_in_week_nights",
    "adr",
    "country",
    DATE_COLUMN,
];

// ============================================================================
// Types
// ============================================================================

/// 예약 레코드 (데이터셋의 한 행)
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRecord {
    pub hotel: String,
    pub is_canceled: bool,
    /// 예약일부터 도착일까지 일수
    pub lead_time: f64,
    pub stays_in_weekend_nights: f64,
    pub stays_in_week_nights: f64,
    /// 평균 일일 요금 (average daily rate)
    pub adr: f64,
    pub country: String,
    pub reservation_status_date: NaiveDateTime,
    /// 컬럼 순서대로의 원본 셀 값
    values: Vec<String>,
}

impl BookingRecord {
    /// 총 숙박일 (주중 + 주말)
    pub fn nights(&self) -> f64 {
        self.stays_in_week_nights + self.stays_in_weekend_nights
    }

    /// 레코드 매출 = 숙박일 × ADR
    pub fn revenue(&self) -> f64 {
        self.nights() * self.adr
    }

    /// 임베딩용 텍스트 요약
    pub fn summary(&self) -> String {
        format!(
            "booking on {} at {}",
            self.reservation_status_date.format("%Y-%m-%d %H:%M:%S"),
            self.hotel
        )
    }

    /// 원본 셀 값 (컬럼 순서)
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// 읽기 전용 데이터셋
#[derive(Debug, Clone)]
pub struct Dataset {
    path: PathBuf,
    columns: Vec<String>,
    records: Vec<BookingRecord>,
    fingerprint: String,
}

impl Dataset {
    /// CSV 파일 로드
    ///
    /// # Errors
    /// * `BookingError::NotFound` - 파일 없음
    /// * `BookingError::Validation` - 필수 컬럼 누락
    /// * `BookingError::Malformed` - 타입 컬럼 파싱 실패
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BookingError::NotFound(path.to_path_buf()).into());
        }

        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read dataset: {:?}", path))?;
        let dataset = Self::from_bytes(path, &bytes)?;

        tracing::info!(
            "Loaded dataset {:?} ({} rows, {} columns)",
            path,
            dataset.len(),
            dataset.columns.len()
        );

        Ok(dataset)
    }

    fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let fingerprint = fingerprint_bytes(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect();

        let positions = ColumnPositions::resolve(&columns)?;

        let mut records = Vec::new();
        for (i, row) in reader.records().enumerate() {
            let row = row.with_context(|| format!("Failed to read CSV row {}", i + 1))?;
            records.push(positions.parse_row(i + 1, &row)?);
        }

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            records,
            fingerprint,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 파일 내용의 SHA-256 (hex)
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[BookingRecord] {
        &self.records
    }

    /// 순번으로 레코드 조회
    pub fn get(&self, index: usize) -> Option<&BookingRecord> {
        self.records.get(index)
    }

    /// 컬럼 이름으로 전체 값 조회
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let pos = self.columns.iter().position(|c| c == name)?;
        Some(
            self.records
                .iter()
                .map(|r| r.values.get(pos).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    /// 레코드를 컬럼 이름 키의 JSON 객체로 변환
    ///
    /// 숫자로 읽히는 셀은 JSON 숫자로, 그 외는 문자열로 둡니다.
    pub fn record_json(&self, record: &BookingRecord) -> Value {
        let mut map = Map::with_capacity(self.columns.len());
        for (column, raw) in self.columns.iter().zip(record.values.iter()) {
            map.insert(column.clone(), cell_to_json(raw));
        }
        Value::Object(map)
    }
}

// ============================================================================
// Row Parsing
// ============================================================================

/// 필수 컬럼의 위치
struct ColumnPositions {
    hotel: usize,
    is_canceled: usize,
    lead_time: usize,
    weekend_nights: usize,
    week_nights: usize,
    adr: usize,
    country: usize,
    date: usize,
}

impl ColumnPositions {
    fn resolve(columns: &[String]) -> Result<Self> {
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| !columns.iter().any(|c| c == *name))
            .collect();

        if !missing.is_empty() {
            return Err(BookingError::Validation(format!(
                "missing required columns: {:?}",
                missing
            ))
            .into());
        }

        let pos = |name: &str| columns.iter().position(|c| c == name).unwrap_or_default();

        Ok(Self {
            hotel: pos("hotel"),
            is_canceled: pos("is_canceled"),
            lead_time: pos("lead_time"),
            weekend_nights: pos("stays_in_weekend_nights"),
            week_nights: pos("stays_in_week_nights"),
            adr: pos("adr"),
            country: pos("country"),
            date: pos(DATE_COLUMN),
        })
    }

    fn parse_row(&self, row_number: usize, row: &csv::StringRecord) -> Result<BookingRecord> {
        let cell = |pos: usize| row.get(pos).unwrap_or("").trim();
        let malformed = |pos: usize, column: &str| BookingError::Malformed {
            row: row_number,
            column: column.to_string(),
            value: cell(pos).to_string(),
        };
        let number = |pos: usize, column: &str| -> Result<f64> {
            cell(pos)
                .parse::<f64>()
                .map_err(|_| malformed(pos, column).into())
        };

        let is_canceled = parse_flag(cell(self.is_canceled))
            .ok_or_else(|| malformed(self.is_canceled, "is_canceled"))?;
        let reservation_status_date =
            parse_date(cell(self.date)).ok_or_else(|| malformed(self.date, DATE_COLUMN))?;

        Ok(BookingRecord {
            hotel: cell(self.hotel).to_string(),
            is_canceled,
            lead_time: number(self.lead_time, "lead_time")?,
            stays_in_weekend_nights: number(self.weekend_nights, "stays_in_weekend_nights")?,
            stays_in_week_nights: number(self.week_nights, "stays_in_week_nights")?,
            adr: number(self.adr, "adr")?,
            country: cell(self.country).to_string(),
            reservation_status_date,
            values: row.iter().map(str::to_string).collect(),
        })
    }
}

/// 취소 플래그 파싱 (0/1, 0.0/1.0, true/false)
fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Some(true),
        "0" | "0.0" | "false" => Some(false),
        _ => None,
    }
}

/// 날짜 파싱
///
/// 지원 형식: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, `M/D/YYYY`
pub fn parse_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }

    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

fn cell_to_json(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// 바이트 내용의 SHA-256 hex 문자열
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Tests
// ============================================================================
