//! 페일오버 수집기 테스트 (일시정지된 tokio 시계 사용).

mod common;

use std::{sync::Arc, time::Duration};

use ashare_collector::modules::{
    AttemptOutcome, FailoverFetcher, FailureClass, FailureReason, FetchPolicy,
};
use ashare_core::{FetchRequest, Period, ProviderError};
use common::{as_provider, date, MockProvider, Step};
use tokio::time::Instant;

fn policy() -> FetchPolicy {
    FetchPolicy {
        timeout: Duration::from_secs(10),
        max_retries: 3,
        retry_delay: Duration::from_secs(2),
    }
}

fn request() -> FetchRequest {
    FetchRequest::tick("600000", date(2024, 3, 8))
}

fn attempt_providers(outcome: &ashare_collector::modules::FetchOutcome) -> Vec<&str> {
    outcome.attempts.iter().map(|a| a.provider.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_then_failover_success() {
    let p1 = Arc::new(MockProvider::always("p1", Step::Hang));
    let p2 = Arc::new(MockProvider::always("p2", Step::Rows(5)));
    let p3 = Arc::new(MockProvider::always("p3", Step::Rows(5)));
    let fetcher = FailoverFetcher::new(vec![as_provider(&p1), as_provider(&p2), as_provider(&p3)], policy());

    let started = Instant::now();
    let outcome = fetcher.fetch(&request()).await;
    let elapsed = started.elapsed();

    assert!(outcome.is_success());
    assert_eq!(outcome.row_count, 5);
    assert_eq!(attempt_providers(&outcome), vec!["p1", "p1", "p1", "p2"]);
    assert!(outcome.attempts[..3]
        .iter()
        .all(|a| a.outcome == AttemptOutcome::Timeout));
    assert_eq!(outcome.attempts[3].outcome, AttemptOutcome::Success { rows: 5 });
    assert_eq!(outcome.attempts[3].provider_rank, 1);
    assert_eq!(p3.calls(), 0);

    // 타임아웃 3회 + 재시도 대기 2회
    assert!(elapsed >= Duration::from_secs(34));
    assert!(elapsed < Duration::from_secs(35));
}

#[tokio::test(start_paused = true)]
async fn test_no_data_is_immediate_success() {
    let p1 = Arc::new(MockProvider::always("p1", Step::NoData));
    let p2 = Arc::new(MockProvider::always("p2", Step::Rows(5)));
    let fetcher = FailoverFetcher::new(vec![as_provider(&p1), as_provider(&p2)], policy());

    let outcome = fetcher.fetch(&request()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.row_count, 0);
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::EmptyResult);
    assert_eq!(p2.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_exhaust_each_provider_in_order() {
    let p1 = Arc::new(MockProvider::always(
        "p1",
        Step::Fail(ProviderError::Network("connection reset".to_string())),
    ));
    let p2 = Arc::new(MockProvider::always("p2", Step::Fail(ProviderError::Status(503))));
    let p3 = Arc::new(MockProvider::always("p3", Step::Rows(1)));
    let fetcher = FailoverFetcher::new(vec![as_provider(&p1), as_provider(&p2), as_provider(&p3)], policy());

    let outcome = fetcher.fetch(&request()).await;

    assert!(outcome.is_success());
    assert_eq!(
        attempt_providers(&outcome),
        vec!["p1", "p1", "p1", "p2", "p2", "p2", "p3"]
    );
    assert_eq!(p1.calls(), 3);
    assert_eq!(p2.calls(), 3);
    assert_eq!(p3.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_recovers_on_same_provider() {
    let p1 = Arc::new(MockProvider::scripted(
        "p1",
        vec![Step::Fail(ProviderError::Status(429)), Step::Rows(2)],
    ));
    let fetcher = FailoverFetcher::new(vec![as_provider(&p1)], policy());

    let started = Instant::now();
    let outcome = fetcher.fetch(&request()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_semantic_error_fails_over_without_retry() {
    let p1 = Arc::new(MockProvider::always(
        "p1",
        Step::Fail(ProviderError::Parse("unexpected token".to_string())),
    ));
    let p2 = Arc::new(MockProvider::always("p2", Step::Rows(3)));
    let fetcher = FailoverFetcher::new(vec![as_provider(&p1), as_provider(&p2)], policy());

    let started = Instant::now();
    let outcome = fetcher.fetch(&request()).await;

    assert!(outcome.is_success());
    assert_eq!(attempt_providers(&outcome), vec!["p1", "p2"]);
    assert_eq!(
        outcome.attempts[0].outcome,
        AttemptOutcome::ProviderError {
            transient: false,
            message: ProviderError::Parse("unexpected token".to_string()).to_string(),
        }
    );
    assert_eq!(p1.calls(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_empty_rows_and_wrong_symbol_fail_over() {
    let p1 = Arc::new(MockProvider::always("p1", Step::EmptyRows));
    let p2 = Arc::new(MockProvider::always("p2", Step::WrongSymbol));
    let p3 = Arc::new(MockProvider::always("p3", Step::Rows(4)));
    let fetcher = FailoverFetcher::new(vec![as_provider(&p1), as_provider(&p2), as_provider(&p3)], policy());

    let outcome = fetcher.fetch(&request()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.row_count, 4);
    assert_eq!(attempt_providers(&outcome), vec!["p1", "p2", "p3"]);
    assert!(matches!(
        outcome.attempts[0].outcome,
        AttemptOutcome::ProviderError { transient: false, .. }
    ));
    assert!(matches!(
        outcome.attempts[1].outcome,
        AttemptOutcome::ProviderError { transient: false, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_all_timed_out_is_network_failure() {
    let p1 = Arc::new(MockProvider::always("p1", Step::Hang));
    let p2 = Arc::new(MockProvider::always("p2", Step::Hang));
    let fetcher = FailoverFetcher::new(vec![as_provider(&p1), as_provider(&p2)], policy());

    let outcome = fetcher.fetch(&request()).await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts.len(), 6);
    let reason = outcome.failure().unwrap();
    assert_eq!(reason, &FailureReason::AllTimedOut);
    assert_eq!(reason.class(), FailureClass::Network);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_failure_keeps_last_error() {
    let p1 = Arc::new(MockProvider::always("p1", Step::Hang));
    let p2 = Arc::new(MockProvider::always(
        "p2",
        Step::Fail(ProviderError::Unsupported("10min".to_string())),
    ));
    let fetcher = FailoverFetcher::new(vec![as_provider(&p1), as_provider(&p2)], policy());

    let outcome = fetcher
        .fetch(&FetchRequest::bars("600000", Period::Min10, date(2024, 3, 4), date(2024, 3, 8)))
        .await;

    let reason = outcome.failure().unwrap();
    assert_eq!(reason.class(), FailureClass::Mixed);
    match reason {
        FailureReason::Mixed {
            timeouts,
            errors,
            last_error,
        } => {
            assert_eq!(*timeouts, 3);
            assert_eq!(*errors, 1);
            assert!(last_error.as_deref().unwrap().starts_with("p2: "));
        }
        other => panic!("Mixed가 아님: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_upstream_failure_class() {
    let p1 = Arc::new(MockProvider::always("p1", Step::Fail(ProviderError::Status(404))));
    let fetcher = FailoverFetcher::new(vec![as_provider(&p1)], policy());

    let outcome = fetcher.fetch(&request()).await;

    assert_eq!(p1.calls(), 1);
    assert_eq!(outcome.failure().unwrap().class(), FailureClass::Upstream);
}

#[tokio::test]
async fn test_no_providers() {
    let fetcher = FailoverFetcher::new(Vec::new(), policy());
    let outcome = fetcher.fetch(&request()).await;

    assert_eq!(outcome.failure(), Some(&FailureReason::NoProviders));
    assert!(outcome.attempts.is_empty());
}
