//! 일괄 저장기 테스트 (메모리 저장소 + 실패 주입).

mod common;

use std::{collections::HashSet, sync::Arc, time::Duration};

use ashare_collector::modules::{BatchPersister, FetchOutcome, PersistPolicy};
use ashare_core::{FetchRequest, Period, Row, TableTarget};
use ashare_data::{MemoryRowStore, RowStore};
use common::{bar, date, rows_for};
use rust_decimal_macros::dec;

fn policy(chunk_size: usize) -> PersistPolicy {
    PersistPolicy {
        chunk_size,
        max_attempts: 3,
        retry_delay: Duration::from_millis(500),
    }
}

/// 종목 10개 × 틱 100개 = 1000행 (같은 거래일 테이블).
fn tick_outcomes() -> Vec<FetchOutcome> {
    (0..10)
        .map(|i| {
            let request = FetchRequest::tick(format!("{:06}", 600000 + i), date(2024, 3, 8));
            let rows = rows_for(&request, &request.symbol, 100);
            FetchOutcome::fetched(request, rows, Vec::new())
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_failed_chunk_marks_every_origin_once() {
    let store = Arc::new(MemoryRowStore::new());
    store.fail_next_upserts(3);
    let persister = BatchPersister::new(Arc::clone(&store) as Arc<dyn RowStore>, policy(1000));

    let mut outcomes = tick_outcomes();
    let requests: HashSet<FetchRequest> = outcomes.iter().map(|o| o.request.clone()).collect();
    for outcome in &mut outcomes {
        persister.accept(outcome).await;
    }
    let stats = persister.flush().await;
    let failures = persister.take_failures().await;

    assert_eq!(store.upsert_calls(), 3);
    assert_eq!(store.total_rows(), 0);
    assert_eq!(stats.chunks_failed, 1);
    assert_eq!(stats.chunks_written, 0);
    assert_eq!(stats.rows_dropped, 1000);

    assert_eq!(failures.len(), 10);
    let failed: HashSet<FetchRequest> = failures.iter().map(|f| f.request.clone()).collect();
    assert_eq!(failed, requests);
    assert!(failures.iter().all(|f| f.table == "tick_data_20240308"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_chunk() {
    let store = Arc::new(MemoryRowStore::new());
    store.fail_next_upserts(2);
    let persister = BatchPersister::new(Arc::clone(&store) as Arc<dyn RowStore>, policy(1000));

    for outcome in &mut tick_outcomes() {
        persister.accept(outcome).await;
    }
    let stats = persister.flush().await;

    assert_eq!(store.upsert_calls(), 3);
    assert_eq!(store.row_count(&TableTarget::Ticks(date(2024, 3, 8))), 1000);
    assert_eq!(stats.chunks_written, 1);
    assert_eq!(stats.rows_inserted, 1000);
    assert!(persister.take_failures().await.is_empty());
}

#[tokio::test]
async fn test_chunks_are_bounded_and_rerun_updates() {
    let store = Arc::new(MemoryRowStore::new());
    let persister = BatchPersister::new(Arc::clone(&store) as Arc<dyn RowStore>, policy(300));

    for outcome in &mut tick_outcomes() {
        persister.accept(outcome).await;
    }
    let first = persister.flush().await;
    assert_eq!(first.chunks_written, 4);
    assert_eq!(first.rows_inserted, 1000);

    // 같은 데이터를 다시 저장하면 행 수는 그대로
    for outcome in &mut tick_outcomes() {
        persister.accept(outcome).await;
    }
    let second = persister.flush().await;
    assert_eq!(second.rows_inserted, 1000);
    assert_eq!(second.rows_updated, 1000);
    assert_eq!(store.total_rows(), 1000);
}

#[tokio::test]
async fn test_duplicate_keys_last_write_wins() {
    let store = Arc::new(MemoryRowStore::new());
    let persister = BatchPersister::new(Arc::clone(&store) as Arc<dyn RowStore>, policy(1000));
    let day = date(2024, 3, 8);

    for close in [dec!(10.10), dec!(10.20), dec!(10.30)] {
        let request = FetchRequest::bars("600000", Period::Daily, day, day);
        let rows = vec![Row::Bar(bar("600000", Period::Daily, day, None, close))];
        persister
            .accept(&mut FetchOutcome::fetched(request, rows, Vec::new()))
            .await;
    }
    let stats = persister.flush().await;

    assert_eq!(stats.rows_deduplicated, 2);
    assert_eq!(stats.rows_inserted, 1);
    let bars = store.query_bars("600000", Period::Daily, day, day).await.unwrap();
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].close, dec!(10.30));
}

#[tokio::test]
async fn test_failed_and_empty_outcomes_are_ignored() {
    let store = Arc::new(MemoryRowStore::new());
    let persister = BatchPersister::new(Arc::clone(&store) as Arc<dyn RowStore>, policy(10));

    let request = FetchRequest::tick("600000", date(2024, 3, 9));
    persister
        .accept(&mut FetchOutcome::fetched(request, Vec::new(), Vec::new()))
        .await;
    let stats = persister.flush().await;

    assert_eq!(store.upsert_calls(), 0);
    assert_eq!(stats.chunks_written, 0);
}
