//! 수집 요청.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Period;

/// 요청 데이터 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// 분할 체결 (틱)
    Tick,
    /// 주기별 OHLCV 캔들
    Bar(Period),
}

/// 요청 대상 날짜.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTarget {
    /// 단일 거래일
    Day(NaiveDate),
    /// 양 끝 포함 구간
    Range { start: NaiveDate, end: NaiveDate },
}

impl DateTarget {
    /// 날짜가 대상에 포함되는지 여부.
    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            Self::Day(day) => date == day,
            Self::Range { start, end } => start <= date && date <= end,
        }
    }

    pub fn start(&self) -> NaiveDate {
        match *self {
            Self::Day(day) => day,
            Self::Range { start, .. } => start,
        }
    }

    pub fn end(&self) -> NaiveDate {
        match *self {
            Self::Day(day) => day,
            Self::Range { end, .. } => end,
        }
    }
}

/// 수집 작업 단위.
///
/// 필드 외의 식별자는 없으며, 재시도/페일오버와 실행 리포트의 키로 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchRequest {
    /// 6자리 종목코드
    pub symbol: String,
    pub kind: DataKind,
    pub target: DateTarget,
}

impl FetchRequest {
    /// 특정 거래일의 틱 요청.
    pub fn tick(symbol: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            kind: DataKind::Tick,
            target: DateTarget::Day(date),
        }
    }

    /// 구간 캔들 요청. `start > end`이면 두 값을 맞바꿉니다.
    pub fn bars(
        symbol: impl Into<String>,
        period: Period,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        Self {
            symbol: symbol.into(),
            kind: DataKind::Bar(period),
            target: DateTarget::Range { start, end },
        }
    }

    /// 캔들 요청이면 주기 반환.
    pub fn period(&self) -> Option<Period> {
        match self.kind {
            DataKind::Bar(period) => Some(period),
            DataKind::Tick => None,
        }
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DataKind::Tick => "tick".to_string(),
            DataKind::Bar(period) => period.to_string(),
        };
        match self.target {
            DateTarget::Day(day) => write!(f, "{} {} {}", self.symbol, kind, day),
            DateTarget::Range { start, end } => {
                write!(f, "{} {} {}..{}", self.symbol, kind, start, end)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bars_request_normalizes_range() {
        let req = FetchRequest::bars("600000", Period::Daily, date(2024, 2, 1), date(2024, 1, 1));
        assert_eq!(req.target.start(), date(2024, 1, 1));
        assert_eq!(req.target.end(), date(2024, 2, 1));
        assert!(req.target.contains(date(2024, 1, 15)));
        assert!(!req.target.contains(date(2024, 2, 2)));
    }

    #[test]
    fn test_request_display() {
        let tick = FetchRequest::tick("000001", date(2024, 3, 8));
        assert_eq!(tick.to_string(), "000001 tick 2024-03-08");

        let bars = FetchRequest::bars("000001", Period::Min30, date(2024, 3, 1), date(2024, 3, 8));
        assert_eq!(bars.to_string(), "000001 30min 2024-03-01..2024-03-08");
        assert_eq!(bars.period(), Some(Period::Min30));
    }
}
