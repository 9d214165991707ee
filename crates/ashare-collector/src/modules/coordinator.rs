//! 일괄 업데이트 조정기.
//!
//! `Idle → RefreshingSymbols → FetchingTick → FetchingBars → Draining → Done` 순서로만 진행합니다.
//! 각 수집 단계는 다음 단계 전에 모두 끝나며, 종목 목록은 단계 시작 시점의 스냅샷을 사용합니다.
//! 종목 목록을 전혀 얻지 못하면 수집 단계를 모두 건너뛰고 바로 `Done`으로 끝납니다.

use std::{sync::Arc, time::Duration};

use ashare_core::{FetchRequest, Period, Symbol, SymbolDirectory};
use ashare_data::RowStore;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{
    persister::{BatchPersister, PersistPolicy, PersistStats},
    scheduler::{OutcomeSink, TaskScheduler},
    symbol_sync::{filter_symbols, sync_symbols},
};
use crate::report::{BatchRunReport, ReportBuilder};

/// 실행 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    RefreshingSymbols,
    FetchingTick,
    FetchingBars,
    Draining,
    Done,
}

/// 캔들 수집 계획.
#[derive(Debug, Clone)]
pub struct BarPlan {
    pub periods: Vec<Period>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// 실행 계획.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// 리포트 종류 이름
    pub kind: String,
    /// 종목 목록을 새로 조회할지 여부. `false`면 저장된 목록을 사용하고,
    /// 저장된 목록이 없을 때만 조회합니다.
    pub refresh_symbols: bool,
    /// 틱 수집 거래일 (없으면 틱 단계 생략)
    pub tick_date: Option<NaiveDate>,
    /// 캔들 수집 계획 (없으면 캔들 단계 생략)
    pub bars: Option<BarPlan>,
    /// 특정 종목만 수집
    pub symbols: Option<Vec<String>>,
}

/// 단계 전진 전용 커서.
struct PhaseCursor {
    current: RunPhase,
}

impl PhaseCursor {
    fn new() -> Self {
        Self {
            current: RunPhase::Idle,
        }
    }

    fn advance(&mut self, next: RunPhase) {
        if next <= self.current {
            warn!(current = ?self.current, requested = ?next, "역방향 단계 전환 무시");
            return;
        }
        info!(from = ?self.current, to = ?next, "단계 전환");
        self.current = next;
    }
}

/// 일괄 업데이트 조정기.
pub struct BatchCoordinator {
    directories: Vec<Arc<dyn SymbolDirectory>>,
    store: Arc<dyn RowStore>,
    scheduler: TaskScheduler,
    persist_policy: PersistPolicy,
    symbol_list_timeout: Duration,
}

impl BatchCoordinator {
    pub fn new(
        directories: Vec<Arc<dyn SymbolDirectory>>,
        store: Arc<dyn RowStore>,
        scheduler: TaskScheduler,
        persist_policy: PersistPolicy,
        symbol_list_timeout: Duration,
    ) -> Self {
        Self {
            directories,
            store,
            scheduler,
            persist_policy,
            symbol_list_timeout,
        }
    }

    /// 계획 1회 실행. 실패는 모두 리포트에 기록되며 에러로 반환되지 않습니다.
    pub async fn run(&self, plan: &RunPlan) -> BatchRunReport {
        let mut report = ReportBuilder::new(&plan.kind);
        let mut cursor = PhaseCursor::new();

        cursor.advance(RunPhase::RefreshingSymbols);
        let Some(symbols) = self.symbol_snapshot(plan.refresh_symbols, &mut report).await else {
            report.failure_note("종목 목록을 가져오지 못해 수집 단계를 모두 건너뜀");
            cursor.advance(RunPhase::Done);
            return report.finish(cursor.current, PersistStats::default());
        };
        let symbols = filter_symbols(symbols, plan.symbols.as_deref());
        info!(symbols = symbols.len(), "수집 대상 종목 확정");

        let persister = Arc::new(BatchPersister::new(
            Arc::clone(&self.store),
            self.persist_policy.clone(),
        ));
        let sink: Arc<dyn OutcomeSink> = Arc::clone(&persister) as Arc<dyn OutcomeSink>;

        if let Some(date) = plan.tick_date {
            cursor.advance(RunPhase::FetchingTick);
            let started_at = Utc::now();
            let requests: Vec<FetchRequest> = symbols
                .iter()
                .map(|s| FetchRequest::tick(s.code.clone(), date))
                .collect();
            let outcomes = self
                .scheduler
                .run_batch("tick", requests, Arc::clone(&sink))
                .await;
            report.record_phase(RunPhase::FetchingTick, started_at, outcomes);
        }

        if let Some(bars) = &plan.bars {
            cursor.advance(RunPhase::FetchingBars);
            let started_at = Utc::now();
            let requests = bar_requests(&symbols, bars);
            let outcomes = self
                .scheduler
                .run_batch("bars", requests, Arc::clone(&sink))
                .await;
            report.record_phase(RunPhase::FetchingBars, started_at, outcomes);
        }

        cursor.advance(RunPhase::Draining);
        let stats = persister.flush().await;
        report.record_persistence_failures(persister.take_failures().await);

        cursor.advance(RunPhase::Done);
        report.finish(cursor.current, stats)
    }

    /// 수집 단계에서 사용할 종목 스냅샷. 목록을 전혀 얻지 못하면 `None`.
    async fn symbol_snapshot(&self, refresh: bool, report: &mut ReportBuilder) -> Option<Vec<Symbol>> {
        if !refresh {
            match self.store.load_symbols().await {
                Ok(symbols) if !symbols.is_empty() => {
                    info!(count = symbols.len(), "저장된 종목 목록 사용");
                    return Some(symbols);
                }
                Ok(_) => info!("저장된 종목 없음, 종목 목록 조회"),
                Err(e) => warn!(error = %e, "저장된 종목 조회 실패, 종목 목록 조회"),
            }
        }

        let synced = sync_symbols(
            &self.directories,
            self.store.as_ref(),
            self.symbol_list_timeout,
            self.persist_policy.chunk_size,
        )
        .await;
        report.symbol_refresh(synced.report);

        if synced.symbols.is_empty() {
            None
        } else {
            Some(synced.symbols)
        }
    }
}

/// 주기 → 종목 순서의 캔들 요청 목록. 중복 주기는 한 번만 요청합니다.
fn bar_requests(symbols: &[Symbol], plan: &BarPlan) -> Vec<FetchRequest> {
    Period::unique(plan.periods.iter().copied())
        .into_iter()
        .flat_map(|period| {
            symbols
                .iter()
                .map(move |s| FetchRequest::bars(s.code.clone(), period, plan.start, plan.end))
        })
        .collect()
}
