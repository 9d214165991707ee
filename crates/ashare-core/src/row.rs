//! 정제된 시세 행과 자연 키.
//!
//! 저장소의 UPSERT 키는 [`RowKey`]와 정확히 일치해야 합니다.
//! 키가 다르면 중복 행이 생기거나 최신 데이터가 과거 데이터로 덮어써집니다.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{DataKind, Period};

/// 체결 성격 (매수/매도/중립).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
    Neutral,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Neutral => "neutral",
        }
    }

    /// 저장된 문자열에서 복원. 알 수 없는 값은 중립.
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "buy" => Self::Buy,
            "sell" => Self::Sell,
            _ => Self::Neutral,
        }
    }
}

/// 단일 체결.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRow {
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub trade_time: NaiveTime,
    pub price: Decimal,
    /// 체결 수량 (주)
    pub volume: i64,
    pub trade_type: TradeSide,
    /// 직전 체결 대비 가격 변화
    pub price_change: Option<Decimal>,
    /// 체결 금액
    pub amount: Option<Decimal>,
}

/// 주기별 OHLCV 캔들.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarRow {
    pub symbol: String,
    pub period: Period,
    pub trade_date: NaiveDate,
    /// 분봉/시간봉의 봉 시각. 일봉 이상은 `None`.
    pub trade_time: Option<NaiveTime>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// 거래량 (주)
    pub volume: i64,
    pub amount: Option<Decimal>,
    pub turnover_rate: Option<Decimal>,
}

impl BarRow {
    /// 키에 사용하는 봉 시각. 일봉 이상은 자정으로 고정하여
    /// NULL이 유니크 제약을 우회하지 않도록 합니다.
    pub fn key_time(&self) -> NaiveTime {
        self.trade_time.unwrap_or(NaiveTime::MIN)
    }
}

/// 저장 대상 행.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Row {
    Tick(TickRow),
    Bar(BarRow),
}

/// 행의 자연 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    Tick {
        symbol: String,
        trade_date: NaiveDate,
        trade_time: NaiveTime,
        price: Decimal,
        volume: i64,
        trade_type: TradeSide,
    },
    Bar {
        symbol: String,
        period: Period,
        trade_date: NaiveDate,
        time: NaiveTime,
    },
}

impl Row {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Tick(t) => &t.symbol,
            Self::Bar(b) => &b.symbol,
        }
    }

    pub fn trade_date(&self) -> NaiveDate {
        match self {
            Self::Tick(t) => t.trade_date,
            Self::Bar(b) => b.trade_date,
        }
    }

    /// 행이 속한 데이터 종류.
    pub fn kind(&self) -> DataKind {
        match self {
            Self::Tick(_) => DataKind::Tick,
            Self::Bar(b) => DataKind::Bar(b.period),
        }
    }

    pub fn natural_key(&self) -> RowKey {
        match self {
            Self::Tick(t) => RowKey::Tick {
                symbol: t.symbol.clone(),
                trade_date: t.trade_date,
                trade_time: t.trade_time,
                price: t.price.normalize(),
                volume: t.volume,
                trade_type: t.trade_type,
            },
            Self::Bar(b) => RowKey::Bar {
                symbol: b.symbol.clone(),
                period: b.period,
                trade_date: b.trade_date,
                time: b.key_time(),
            },
        }
    }

    /// 행이 저장될 테이블.
    pub fn table(&self) -> TableTarget {
        match self {
            Self::Tick(t) => TableTarget::Ticks(t.trade_date),
            Self::Bar(b) => TableTarget::Bars(b.period),
        }
    }
}

/// 저장 테이블.
///
/// 틱은 거래일별(`tick_data_YYYYMMDD`), 캔들은 주기별(`basic_data_<period>`) 테이블로 분리됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableTarget {
    Ticks(NaiveDate),
    Bars(Period),
}

impl TableTarget {
    /// 물리 테이블 이름. 내부에서 생성되는 식별자이므로 SQL에 그대로 사용 가능.
    pub fn table_name(&self) -> String {
        match self {
            Self::Ticks(date) => format!("tick_data_{}", date.format("%Y%m%d")),
            Self::Bars(period) => format!("basic_data_{}", period.as_str().replace('-', "_")),
        }
    }

    /// UPSERT 충돌 판정 컬럼 (자연 키와 동일).
    pub fn natural_key_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Ticks(_) => &[
                "stock_code",
                "trade_date",
                "trade_time",
                "price",
                "volume",
                "trade_type",
            ],
            Self::Bars(_) => &["stock_code", "trade_date", "bar_time"],
        }
    }
}

impl fmt::Display for TableTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.table_name())
    }
}
