//! 전처리 모듈 - 원본 예약 CSV 정제
//!
//! 결측값을 채우고 예약 상태 날짜를 정규화한 뒤, 날짜가 없는 행을 버립니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::{parse_date, DATE_COLUMN};
use crate::error::BookingError;

/// 전처리 입력에 반드시 있어야 하는 컬럼
const REQUIRED_COLUMNS: [&str; 4] = [
    DATE_COLUMN,
    "stays_in_week_nights",
    "stays_in_weekend_nights",
    "adr",
];

/// 결측 시 채울 기본값 (컬럼, 값)
const FILL_VALUES: [(&str, &str); 4] = [
    ("children", "0"),
    ("country", "unknown"),
    ("agent", "0"),
    ("company", "0"),
];

/// 결측으로 취급하는 셀 값
const MISSING_MARKERS: [&str; 5] = ["", "NA", "N/A", "NULL", "nan"];

/// 전처리 결과
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub dropped_rows: usize,
    pub filled_cells: usize,
    pub output_path: PathBuf,
}

/// 원본 CSV를 정제하여 저장
///
/// # Arguments
/// * `input` - 원본 CSV 경로
/// * `output` - 정제된 CSV 경로 (상위 디렉토리 자동 생성)
pub fn preprocess(input: &Path, output: &Path) -> Result<PreprocessReport> {
    if !input.exists() {
        return Err(BookingError::NotFound(input.to_path_buf()).into());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(input)
        .with_context(|| format!("Failed to open input CSV: {:?}", input))?;

    let headers = reader.headers().context("Failed to read CSV header")?.clone();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|name| !headers.iter().any(|h| h == *name))
        .collect();
    if !missing.is_empty() {
        return Err(
            BookingError::Validation(format!("missing required columns: {:?}", missing)).into(),
        );
    }

    let date_pos = headers
        .iter()
        .position(|h| h == DATE_COLUMN)
        .unwrap_or_default();
    let fill_positions: Vec<(usize, &str)> = FILL_VALUES
        .iter()
        .filter_map(|(column, value)| {
            headers
                .iter()
                .position(|h| h == *column)
                .map(|pos| (pos, *value))
        })
        .collect();

    // 부모 디렉토리 생성
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create output CSV: {:?}", output))?;
    writer
        .write_record(&headers)
        .context("Failed to write CSV header")?;

    let mut input_rows = 0;
    let mut output_rows = 0;
    let mut filled_cells = 0;

    for (i, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Failed to read CSV row {}", i + 1))?;
        input_rows += 1;

        let mut cells: Vec<String> = row.iter().map(str::to_string).collect();

        for &(pos, value) in &fill_positions {
            if let Some(cell) = cells.get_mut(pos) {
                if is_missing(cell) {
                    *cell = value.to_string();
                    filled_cells += 1;
                }
            }
        }

        let date = cells.get(date_pos).and_then(|raw| parse_date(raw));
        let Some(date) = date else {
            continue;
        };
        if let Some(cell) = cells.get_mut(date_pos) {
            *cell = if date.time() == chrono::NaiveTime::MIN {
                date.format("%Y-%m-%d").to_string()
            } else {
                date.format("%Y-%m-%d %H:%M:%S").to_string()
            };
        }

        writer
            .write_record(&cells)
            .with_context(|| format!("Failed to write CSV row {}", i + 1))?;
        output_rows += 1;
    }

    writer.flush().context("Failed to flush output CSV")?;

    let dropped_rows = input_rows - output_rows;
    tracing::info!(
        "Dropped {} rows with missing reservation dates",
        dropped_rows
    );
    tracing::info!("Data cleaned and saved to {:?}", output);

    Ok(PreprocessReport {
        input_rows,
        output_rows,
        dropped_rows,
        filled_cells,
        output_path: output.to_path_buf(),
    })
}

fn is_missing(cell: &str) -> bool {
    let trimmed = cell.trim();
    MISSING_MARKERS
        .iter()
        .any(|marker| trimmed.eq_ignore_ascii_case(marker))
}

// ============================================================================
// Tests
// ============================================================================
