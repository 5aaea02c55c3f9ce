//! Analytics 모듈 - 데이터셋 기술 통계
//!
//! 매출 추이, 취소율, 국가별 분포, 리드타임 분포를 계산합니다.
//! 모두 읽기 전용이며 차트 대신 차트를 그릴 데이터 시리즈를 반환합니다.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::Datelike;
use serde::Serialize;

use crate::dataset::Dataset;
use crate::error::BookingError;

/// 국가별 분포에서 남기는 상위 국가 수
pub const TOP_COUNTRIES: usize = 10;
/// 리드타임 히스토그램 구간 수
pub const LEAD_TIME_BINS: usize = 50;
/// 밀도 추정 평가 지점 수
pub const DENSITY_POINTS: usize = 200;

// ============================================================================
// Types
// ============================================================================

/// 월별 매출
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`
    pub month: String,
    pub revenue: f64,
}

/// 국가별 예약 수
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryCount {
    pub country: String,
    pub bookings: usize,
}

/// 히스토그램 구간 `[start, end)` (마지막 구간은 닫힘)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// 밀도 곡선의 한 점
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityPoint {
    pub x: f64,
    pub density: f64,
}

/// 리드타임 분포
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadTimeDistribution {
    pub bins: Vec<HistogramBin>,
    pub density: Vec<DensityPoint>,
    /// 가우시안 커널 대역폭 (분산이 0이면 None)
    pub bandwidth: Option<f64>,
}

/// 전체 분석 결과 (`/analytics` 응답)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub revenue_trends: Vec<MonthlyRevenue>,
    pub cancellation_rate: f64,
    pub geographical_distribution: Vec<CountryCount>,
    pub lead_time_distribution: LeadTimeDistribution,
}

impl AnalyticsReport {
    /// 네 가지 분석을 모두 계산
    pub fn compute(dataset: &Dataset) -> Result<Self> {
        Ok(Self {
            revenue_trends: revenue_trends(dataset),
            cancellation_rate: cancellation_rate(dataset)?,
            geographical_distribution: geographical_distribution(dataset),
            lead_time_distribution: lead_time_distribution(dataset)?,
        })
    }
}

// ============================================================================
// Computations
// ============================================================================

/// 월별 매출 추이 (시간순)
///
/// 레코드 매출 = (주중 + 주말 숙박일) × ADR, 예약 상태 날짜의 달로 묶어 합산.
pub fn revenue_trends(dataset: &Dataset) -> Vec<MonthlyRevenue> {
    let mut by_month: BTreeMap<(i32, u32), f64> = BTreeMap::new();

    for record in dataset.records() {
        let date = record.reservation_status_date;
        *by_month.entry((date.year(), date.month())).or_insert(0.0) += record.revenue();
    }

    by_month
        .into_iter()
        .map(|((year, month), revenue)| MonthlyRevenue {
            month: format!("{:04}-{:02}", year, month),
            revenue,
        })
        .collect()
}

/// 취소율 (%)
pub fn cancellation_rate(dataset: &Dataset) -> Result<f64> {
    if dataset.is_empty() {
        return Err(BookingError::EmptyDataset.into());
    }

    let canceled = dataset.records().iter().filter(|r| r.is_canceled).count();
    Ok(canceled as f64 * 100.0 / dataset.len() as f64)
}

/// 예약 수 상위 국가 (많은 순, 같으면 국가 코드 순)
pub fn geographical_distribution(dataset: &Dataset) -> Vec<CountryCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in dataset.records() {
        *counts.entry(record.country.as_str()).or_insert(0) += 1;
    }

    let mut ranked: Vec<CountryCount> = counts
        .into_iter()
        .map(|(country, bookings)| CountryCount {
            country: country.to_string(),
            bookings,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.bookings
            .cmp(&a.bookings)
            .then_with(|| a.country.cmp(&b.country))
    });
    ranked.truncate(TOP_COUNTRIES);
    ranked
}

/// 리드타임 히스토그램 + 커널 밀도 추정
pub fn lead_time_distribution(dataset: &Dataset) -> Result<LeadTimeDistribution> {
    let values: Vec<f64> = dataset.records().iter().map(|r| r.lead_time).collect();
    if values.is_empty() {
        return Err(BookingError::EmptyDataset.into());
    }

    let bins = histogram(&values, LEAD_TIME_BINS);
    let bandwidth = scott_bandwidth(&values);
    let density = match bandwidth {
        Some(h) => {
            let (min, max) = min_max(&values);
            gaussian_kde(&values, h, min, max, DENSITY_POINTS)
        }
        None => vec![],
    };

    Ok(LeadTimeDistribution {
        bins,
        density,
        bandwidth,
    })
}

// ============================================================================
// Numeric Helpers
// ============================================================================

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// 등간격 히스토그램
///
/// 범위가 한 점이면 `[v - 0.5, v + 0.5]`로 넓힙니다.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return vec![];
    }

    let (mut lo, mut hi) = min_max(values);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: lo + width * i as f64,
            end: if i + 1 == bins {
                hi
            } else {
                lo + width * (i + 1) as f64
            },
            count,
        })
        .collect()
}

/// Scott 규칙 대역폭: 표본 표준편차(ddof=1) × n^(-1/5)
pub fn scott_bandwidth(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = variance.sqrt();

    if std == 0.0 || !std.is_finite() {
        return None;
    }

    Some(std * (n as f64).powf(-0.2))
}

/// 가우시안 커널 밀도를 `[lo, hi]` 구간 `points`개 지점에서 평가
pub fn gaussian_kde(
    values: &[f64],
    bandwidth: f64,
    lo: f64,
    hi: f64,
    points: usize,
) -> Vec<DensityPoint> {
    if values.is_empty() || points == 0 || bandwidth <= 0.0 {
        return vec![];
    }

    let norm = 1.0 / (values.len() as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
    let step = if points > 1 {
        (hi - lo) / (points - 1) as f64
    } else {
        0.0
    };

    (0..points)
        .map(|i| {
            let x = lo + step * i as f64;
            let sum: f64 = values
                .iter()
                .map(|v| {
                    let z = (x - v) / bandwidth;
                    (-0.5 * z * z).exp()
                })
                .sum();
            DensityPoint {
                x,
                density: sum * norm,
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
