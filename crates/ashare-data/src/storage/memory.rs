//! 메모리 저장소.
//!
//! PostgreSQL과 같은 UPSERT 의미를 메모리에서 재현합니다.
//! `--dry-run` 실행과 파이프라인 테스트에 사용하며, 실패 주입을 지원합니다.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use ashare_core::{BarRow, Market, Period, Row, RowKey, Symbol, TableTarget, TickRow};
use chrono::NaiveDate;

use super::{RowStore, UpsertCount};
use crate::{Result, StoreError};

#[derive(Default)]
struct Tables {
    rows: HashMap<TableTarget, HashMap<RowKey, Row>>,
    symbols: HashMap<(String, Market), Symbol>,
}

/// 메모리 저장소.
#[derive(Default)]
pub struct MemoryRowStore {
    tables: Mutex<Tables>,
    fail_remaining: AtomicUsize,
    upsert_calls: AtomicUsize,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 다음 `count`번의 행 UPSERT를 실패시킵니다.
    pub fn fail_next_upserts(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// 지금까지의 행 UPSERT 호출 수 (실패 포함).
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// 테이블의 행 수.
    pub fn row_count(&self, target: &TableTarget) -> usize {
        self.lock().rows.get(target).map_or(0, HashMap::len)
    }

    /// 전체 테이블의 행 수 합계.
    pub fn total_rows(&self) -> usize {
        self.lock().rows.values().map(HashMap::len).sum()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // 보호 대상은 단순 맵이므로 패닉으로 오염돼도 계속 사용
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn upsert(&self, target: &TableTarget, rows: &[Row]) -> Result<UpsertCount> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        if self.take_injected_failure() {
            return Err(StoreError::Injected(format!(
                "{} 행 쓰기 실패 ({})",
                rows.len(),
                target
            )));
        }

        if let Some(row) = rows.iter().find(|r| r.table() != *target) {
            return Err(StoreError::InvalidTable(format!(
                "{} 행은 {}에 저장할 수 없음",
                row.table(),
                target
            )));
        }

        let mut tables = self.lock();
        let table = tables.rows.entry(*target).or_default();
        let mut count = UpsertCount::default();
        for row in rows {
            match table.insert(row.natural_key(), row.clone()) {
                Some(_) => count.updated += 1,
                None => count.inserted += 1,
            }
        }
        Ok(count)
    }

    async fn upsert_symbols(&self, symbols: &[Symbol]) -> Result<UpsertCount> {
        let mut tables = self.lock();
        let mut count = UpsertCount::default();
        for symbol in symbols {
            let key = (symbol.code.clone(), symbol.market);
            match tables.symbols.insert(key, symbol.clone()) {
                Some(_) => count.updated += 1,
                None => count.inserted += 1,
            }
        }
        Ok(count)
    }

    async fn load_symbols(&self) -> Result<Vec<Symbol>> {
        let mut symbols: Vec<Symbol> = self.lock().symbols.values().cloned().collect();
        symbols.sort_by(|a, b| (a.market, &a.code).cmp(&(b.market, &b.code)));
        Ok(symbols)
    }

    async fn query_ticks(&self, symbol: &str, date: NaiveDate) -> Result<Vec<TickRow>> {
        let tables = self.lock();
        let mut ticks: Vec<TickRow> = tables
            .rows
            .get(&TableTarget::Ticks(date))
            .into_iter()
            .flat_map(HashMap::values)
            .filter_map(|row| match row {
                Row::Tick(t) if t.symbol == symbol => Some(t.clone()),
                _ => None,
            })
            .collect();
        ticks.sort_by_key(|t| t.trade_time);
        Ok(ticks)
    }

    async fn query_bars(
        &self,
        symbol: &str,
        period: Period,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BarRow>> {
        let tables = self.lock();
        let mut bars: Vec<BarRow> = tables
            .rows
            .get(&TableTarget::Bars(period))
            .into_iter()
            .flat_map(HashMap::values)
            .filter_map(|row| match row {
                Row::Bar(b) if b.symbol == symbol && start <= b.trade_date && b.trade_date <= end => {
                    Some(b.clone())
                }
                _ => None,
            })
            .collect();
        bars.sort_by_key(|b| (b.trade_date, b.key_time()));
        Ok(bars)
    }
}
