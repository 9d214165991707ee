//! 일괄 저장기.
//!
//! 성공 결과의 행을 테이블별 버퍼에 모으고, 버퍼가 청크 크기에 도달하면 한 번의
//! 일괄 UPSERT로 저장합니다. 버퍼 추가, 저장 판단, 저장은 하나의 배타 구간에서 수행되어
//! 동시에 두 워커가 같은 청크를 쓰지 않습니다.
//!
//! 저장에 끝내 실패한 청크는 그 청크에 행을 넣은 모든 요청을 `Persistence` 실패로 기록합니다.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use ashare_core::{FetchRequest, Row, TableTarget};
use ashare_data::{RowStore, UpsertCount};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{outcome::FetchOutcome, scheduler::OutcomeSink};
use crate::{
    config::PersistConfig,
    retry::{with_retry, RetryConfig},
};

/// 저장 정책.
#[derive(Debug, Clone)]
pub struct PersistPolicy {
    /// 테이블별 청크 크기
    pub chunk_size: usize,
    /// 청크당 최대 쓰기 시도 횟수
    pub max_attempts: u32,
    /// 재시도 간 대기
    pub retry_delay: Duration,
}

impl Default for PersistPolicy {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl From<&PersistConfig> for PersistPolicy {
    fn from(config: &PersistConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay(),
        }
    }
}

/// 저장 통계.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    pub chunks_written: usize,
    pub chunks_failed: usize,
    pub rows_inserted: usize,
    pub rows_updated: usize,
    /// 청크 내 자연 키 중복으로 합쳐진 행 수
    pub rows_deduplicated: usize,
    /// 저장 실패로 버려진 행 수
    pub rows_dropped: usize,
}

/// 저장 실패한 요청.
#[derive(Debug, Clone)]
pub struct PersistFailure {
    pub request: FetchRequest,
    pub table: String,
    pub message: String,
}

struct PendingRow {
    origin: Arc<FetchRequest>,
    row: Row,
}

#[derive(Default)]
struct PersisterState {
    buffers: BTreeMap<TableTarget, Vec<PendingRow>>,
    failures: Vec<PersistFailure>,
    failed_requests: HashSet<FetchRequest>,
    stats: PersistStats,
}

/// 청크 단위 일괄 저장기.
pub struct BatchPersister {
    store: Arc<dyn RowStore>,
    policy: PersistPolicy,
    retry: RetryConfig,
    state: Mutex<PersisterState>,
}

impl BatchPersister {
    pub fn new(store: Arc<dyn RowStore>, policy: PersistPolicy) -> Self {
        let retry = RetryConfig::constant(policy.max_attempts, policy.retry_delay);
        let policy = PersistPolicy {
            chunk_size: policy.chunk_size.max(1),
            ..policy
        };
        Self {
            store,
            policy,
            retry,
            state: Mutex::new(PersisterState::default()),
        }
    }

    /// 결과 1건 수용. 실패 결과와 0행 결과는 무시합니다.
    pub async fn accept(&self, outcome: &mut FetchOutcome) {
        if !outcome.is_success() {
            return;
        }
        let rows = outcome.take_rows();
        if rows.is_empty() {
            return;
        }

        let origin = Arc::new(outcome.request.clone());
        let chunk_size = self.policy.chunk_size;
        let mut state = self.state.lock().await;

        for row in rows {
            state.buffers.entry(row.table()).or_default().push(PendingRow {
                origin: Arc::clone(&origin),
                row,
            });
        }

        let mut ready = Vec::new();
        for (target, buffer) in state.buffers.iter_mut() {
            while buffer.len() >= chunk_size {
                ready.push((*target, buffer.drain(..chunk_size).collect::<Vec<_>>()));
            }
        }
        for (target, chunk) in ready {
            self.write_chunk(&mut state, target, chunk).await;
        }
    }

    /// 남은 버퍼를 모두 저장합니다.
    pub async fn flush(&self) -> PersistStats {
        let chunk_size = self.policy.chunk_size;
        let mut state = self.state.lock().await;
        let buffers = std::mem::take(&mut state.buffers);

        for (target, mut buffer) in buffers {
            while !buffer.is_empty() {
                let take = buffer.len().min(chunk_size);
                let chunk: Vec<_> = buffer.drain(..take).collect();
                self.write_chunk(&mut state, target, chunk).await;
            }
        }

        info!(
            chunks_written = state.stats.chunks_written,
            chunks_failed = state.stats.chunks_failed,
            inserted = state.stats.rows_inserted,
            updated = state.stats.rows_updated,
            "버퍼 저장 완료"
        );
        state.stats.clone()
    }

    /// 누적 저장 실패를 꺼냅니다.
    pub async fn take_failures(&self) -> Vec<PersistFailure> {
        std::mem::take(&mut self.state.lock().await.failures)
    }

    /// 청크 1개 저장 (중복 키 합치기 → 재시도 포함 UPSERT).
    async fn write_chunk(&self, state: &mut PersisterState, target: TableTarget, chunk: Vec<PendingRow>) {
        let (rows, origins, deduplicated) = collapse_chunk(chunk);
        state.stats.rows_deduplicated += deduplicated;

        let result = with_retry(&self.retry, || self.store.upsert(&target, &rows)).await;
        match result {
            Ok(count) => {
                record_written(&mut state.stats, count);
                debug!(
                    table = %target,
                    rows = rows.len(),
                    inserted = count.inserted,
                    updated = count.updated,
                    "청크 저장"
                );
            }
            Err(e) => {
                error!(
                    table = %target,
                    rows = rows.len(),
                    requests = origins.len(),
                    error = %e,
                    "청크 저장 최종 실패"
                );
                state.stats.chunks_failed += 1;
                state.stats.rows_dropped += rows.len();

                let message = e.to_string();
                for origin in origins {
                    if state.failed_requests.insert(origin.as_ref().clone()) {
                        state.failures.push(PersistFailure {
                            request: origin.as_ref().clone(),
                            table: target.table_name(),
                            message: message.clone(),
                        });
                    }
                }
            }
        }
    }
}

#[async_trait]
impl OutcomeSink for BatchPersister {
    async fn accept(&self, outcome: &mut FetchOutcome) {
        BatchPersister::accept(self, outcome).await;
    }
}

fn record_written(stats: &mut PersistStats, count: UpsertCount) {
    stats.chunks_written += 1;
    stats.rows_inserted += count.inserted;
    stats.rows_updated += count.updated;
}

/// 자연 키 중복을 합칩니다 (마지막 값 우선, 첫 등장 위치 유지).
///
/// 반환: (저장할 행, 청크에 기여한 요청 목록, 합쳐진 행 수)
fn collapse_chunk(chunk: Vec<PendingRow>) -> (Vec<Row>, Vec<Arc<FetchRequest>>, usize) {
    let mut positions = HashMap::with_capacity(chunk.len());
    let mut rows: Vec<Row> = Vec::with_capacity(chunk.len());
    let mut origins: Vec<Arc<FetchRequest>> = Vec::new();
    let mut seen_origins = HashSet::new();
    let mut deduplicated = 0;

    for pending in chunk {
        if seen_origins.insert(Arc::as_ptr(&pending.origin)) {
            origins.push(Arc::clone(&pending.origin));
        }

        let key = pending.row.natural_key();
        match positions.get(&key) {
            Some(&pos) => {
                rows[pos] = pending.row;
                deduplicated += 1;
            }
            None => {
                positions.insert(key, rows.len());
                rows.push(pending.row);
            }
        }
    }

    (rows, origins, deduplicated)
}

#[cfg(test)]
mod tests {
    use ashare_core::{BarRow, Period};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    fn bar(close: Decimal) -> Row {
        Row::Bar(BarRow {
            symbol: "600000".to_string(),
            period: Period::Daily,
            trade_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            trade_time: None,
            open: dec!(7),
            high: dec!(8),
            low: dec!(6),
            close,
            volume: 100,
            amount: None,
            turnover_rate: None,
        })
    }

    #[test]
    fn test_collapse_chunk_last_write_wins() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let first = Arc::new(FetchRequest::bars("600000", Period::Daily, date, date));
        let second = Arc::new(FetchRequest::bars("600000", Period::Daily, date, date));

        let chunk = vec![
            PendingRow {
                origin: Arc::clone(&first),
                row: bar(dec!(7.1)),
            },
            PendingRow {
                origin: Arc::clone(&second),
                row: bar(dec!(7.3)),
            },
        ];
        let (rows, origins, deduplicated) = collapse_chunk(chunk);

        assert_eq!(rows.len(), 1);
        assert_eq!(deduplicated, 1);
        assert_eq!(origins.len(), 2);
        match &rows[0] {
            Row::Bar(b) => assert_eq!(b.close, dec!(7.3)),
            Row::Tick(_) => unreachable!(),
        }
    }

    #[test]
    fn test_policy_from_config() {
        let policy = PersistPolicy::from(&PersistConfig {
            chunk_size: 200,
            max_attempts: 5,
            retry_delay_ms: 100,
        });
        assert_eq!(policy.chunk_size, 200);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.retry_delay, Duration::from_millis(100));
    }
}
