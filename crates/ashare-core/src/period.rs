//! 캔들 주기.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 지원하는 캔들 주기.
///
/// 문자열 표현(`1min` … `year`)은 설정, 테이블 이름, 리포트에서 그대로 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1min")]
    Min1,
    #[serde(rename = "5min")]
    Min5,
    #[serde(rename = "10min")]
    Min10,
    #[serde(rename = "15min")]
    Min15,
    #[serde(rename = "30min")]
    Min30,
    #[serde(rename = "1hour")]
    Hour1,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "quarter")]
    Quarter,
    #[serde(rename = "half-year")]
    HalfYear,
    #[serde(rename = "year")]
    Year,
}

impl Period {
    /// 전체 주기 목록 (짧은 주기부터).
    pub const ALL: [Period; 12] = [
        Period::Min1,
        Period::Min5,
        Period::Min10,
        Period::Min15,
        Period::Min30,
        Period::Hour1,
        Period::Daily,
        Period::Week,
        Period::Month,
        Period::Quarter,
        Period::HalfYear,
        Period::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Min1 => "1min",
            Self::Min5 => "5min",
            Self::Min10 => "10min",
            Self::Min15 => "15min",
            Self::Min30 => "30min",
            Self::Hour1 => "1hour",
            Self::Daily => "daily",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::HalfYear => "half-year",
            Self::Year => "year",
        }
    }

    /// 처음 나온 순서를 유지하며 중복 주기를 제거합니다.
    ///
    /// 같은 주기가 두 번 들어오면 동일한 [`FetchRequest`](crate::FetchRequest)가 생기므로
    /// 요청 목록을 만들기 전에 항상 거칩니다.
    pub fn unique(periods: impl IntoIterator<Item = Period>) -> Vec<Period> {
        let mut unique = Vec::new();
        for period in periods {
            if !unique.contains(&period) {
                unique.push(period);
            }
        }
        unique
    }

    /// 분봉/시간봉 여부 (행에 체결 시각이 포함됨).
    pub fn is_intraday(&self) -> bool {
        self.minutes().is_some()
    }

    /// 분 단위 길이. 일봉 이상은 `None`.
    pub fn minutes(&self) -> Option<u32> {
        match self {
            Self::Min1 => Some(1),
            Self::Min5 => Some(5),
            Self::Min10 => Some(10),
            Self::Min15 => Some(15),
            Self::Min30 => Some(30),
            Self::Hour1 => Some(60),
            _ => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 알 수 없는 주기 문자열.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("지원하지 않는 주기: {0}")]
pub struct ParsePeriodError(pub String);

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or(ParsePeriodError(s.to_string()))
    }
}
