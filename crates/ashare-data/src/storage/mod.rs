//! 시세 저장소.
//!
//! 수집 파이프라인은 [`RowStore`] trait만 사용합니다.
//! - [`PgRowStore`]: PostgreSQL (운영)
//! - [`MemoryRowStore`]: 메모리 (드라이런, 테스트)

mod memory;
mod postgres;

use async_trait::async_trait;
use ashare_core::{BarRow, Period, Row, Symbol, TableTarget, TickRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use memory::MemoryRowStore;
pub use postgres::PgRowStore;

use crate::Result;

/// 일괄 UPSERT 결과.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCount {
    /// 새로 삽입된 행 수
    pub inserted: usize,
    /// 기존 키가 갱신된 행 수
    pub updated: usize,
}

impl UpsertCount {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

impl std::ops::AddAssign for UpsertCount {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
    }
}

/// 자연 키 기반 저장소.
///
/// 모든 쓰기는 멱등입니다. 같은 키로 다시 쓰면 키가 아닌 모든 필드를
/// 무조건 덮어씁니다 (마지막 쓰기 우선).
#[async_trait]
pub trait RowStore: Send + Sync {
    /// 한 테이블에 대한 일괄 UPSERT.
    ///
    /// 모든 행은 `target`에 속해야 하며, 한 호출 안에서 자연 키가 중복되면 안 됩니다.
    async fn upsert(&self, target: &TableTarget, rows: &[Row]) -> Result<UpsertCount>;

    /// 종목 목록 UPSERT (`(code, market)` 기준 교체).
    async fn upsert_symbols(&self, symbols: &[Symbol]) -> Result<UpsertCount>;

    /// 저장된 종목 목록.
    async fn load_symbols(&self) -> Result<Vec<Symbol>>;

    /// 한 종목, 한 거래일의 틱 (체결 시각 순).
    async fn query_ticks(&self, symbol: &str, date: NaiveDate) -> Result<Vec<TickRow>>;

    /// 한 종목의 구간 캔들 (시간 순).
    async fn query_bars(
        &self,
        symbol: &str,
        period: Period,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BarRow>>;
}
