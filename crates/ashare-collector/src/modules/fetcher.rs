//! 페일오버 수집기.
//!
//! 제공자를 우선순위 순서로 순회하며 요청 1건을 수집합니다.
//!
//! ## 시도 규칙
//!
//! - 모든 시도는 타임아웃으로 제한됩니다 (기본 10초).
//! - 일시적 에러(연결, 5xx, 429)와 타임아웃은 같은 제공자에서 최대 `max_retries`회까지 시도하고,
//!   시도 사이에 `retry_delay`만큼 대기합니다.
//! - 의미 에러(형식, 불일치, 미지원)는 재시도 없이 즉시 다음 제공자로 넘어갑니다.
//! - `NoData`는 즉시 0행 성공으로 종료합니다.
//! - 빈 `Rows`는 의미 에러로 취급합니다. 데이터 부재는 `NoData`로만 표현되어야 합니다.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use ashare_core::{FetchRequest, ProviderClient, ProviderError, ProviderReply, Row};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::outcome::{summarize_failure, AttemptOutcome, FailureReason, FetchAttempt, FetchOutcome};
use crate::config::FetchConfig;

/// 시도 정책.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// 시도당 타임아웃
    pub timeout: Duration,
    /// 제공자당 최대 시도 횟수 (최소 1)
    pub max_retries: u32,
    /// 같은 제공자 재시도 간 대기
    pub retry_delay: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl From<&FetchConfig> for FetchPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }
}

/// 제공자 시도 1회의 분류 결과.
enum Step {
    Done(Vec<Row>),
    Retry,
    NextProvider,
}

/// 우선순위 제공자 목록 위의 페일오버 수집기.
pub struct FailoverFetcher {
    providers: Vec<Arc<dyn ProviderClient>>,
    policy: FetchPolicy,
}

impl FailoverFetcher {
    pub fn new(providers: Vec<Arc<dyn ProviderClient>>, policy: FetchPolicy) -> Self {
        Self { providers, policy }
    }

    /// 요청 1건 수집. 항상 종결 결과를 반환합니다.
    #[instrument(skip(self, request), fields(request = %request))]
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        if self.providers.is_empty() {
            return FetchOutcome::failed(request.clone(), FailureReason::NoProviders, Vec::new());
        }

        let max_retries = self.policy.max_retries.max(1);
        let mut attempts = Vec::new();

        for (rank, provider) in self.providers.iter().enumerate() {
            for attempt_no in 1..=max_retries {
                let started_at = Utc::now();
                let clock = Instant::now();
                let result = tokio::time::timeout(self.policy.timeout, provider.fetch(request)).await;
                let elapsed_ms = clock.elapsed().as_millis() as u64;

                let (outcome, step) = classify(request, result);
                log_attempt(provider.name(), attempt_no, &outcome);
                attempts.push(FetchAttempt {
                    provider_rank: rank,
                    provider: provider.name().to_string(),
                    started_at,
                    elapsed_ms,
                    outcome,
                });

                match step {
                    Step::Done(rows) => {
                        return FetchOutcome::fetched(request.clone(), rows, attempts);
                    }
                    Step::NextProvider => break,
                    Step::Retry if attempt_no < max_retries => {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                    Step::Retry => {}
                }
            }

            if rank + 1 < self.providers.len() {
                info!(
                    from = provider.name(),
                    to = self.providers[rank + 1].name(),
                    "다음 제공자로 페일오버"
                );
            }
        }

        let reason = summarize_failure(&attempts);
        warn!(reason = %reason, attempts = attempts.len(), "모든 제공자 실패");
        FetchOutcome::failed(request.clone(), reason, attempts)
    }
}

fn classify(
    request: &FetchRequest,
    result: Result<Result<ProviderReply, ProviderError>, tokio::time::error::Elapsed>,
) -> (AttemptOutcome, Step) {
    match result {
        Err(_) => (AttemptOutcome::Timeout, Step::Retry),
        Ok(Ok(ProviderReply::NoData)) => (AttemptOutcome::EmptyResult, Step::Done(Vec::new())),
        Ok(Ok(ProviderReply::Rows(rows))) => match validate_rows(request, &rows) {
            Ok(()) => (AttemptOutcome::Success { rows: rows.len() }, Step::Done(rows)),
            Err(e) => (
                AttemptOutcome::ProviderError {
                    transient: false,
                    message: e.to_string(),
                },
                Step::NextProvider,
            ),
        },
        Ok(Err(e)) => {
            let transient = e.is_transient();
            let step = if transient { Step::Retry } else { Step::NextProvider };
            (
                AttemptOutcome::ProviderError {
                    transient,
                    message: e.to_string(),
                },
                step,
            )
        }
    }
}

/// 응답 행이 요청 종목/종류/날짜와 일치하는지 검증.
fn validate_rows(request: &FetchRequest, rows: &[Row]) -> Result<(), ProviderError> {
    if rows.is_empty() {
        return Err(ProviderError::Mismatch(
            "빈 행 목록 (데이터 없음은 NoData로 응답해야 함)".to_string(),
        ));
    }

    for row in rows {
        if row.symbol() != request.symbol {
            return Err(ProviderError::Mismatch(format!(
                "종목 {} != 요청 {}",
                row.symbol(),
                request.symbol
            )));
        }
        if row.kind() != request.kind {
            return Err(ProviderError::Mismatch(format!(
                "종류 {:?} != 요청 {:?}",
                row.kind(),
                request.kind
            )));
        }
        if !request.target.contains(row.trade_date()) {
            return Err(ProviderError::Mismatch(format!(
                "날짜 {}가 요청 범위 밖 ({})",
                row.trade_date(),
                request
            )));
        }
    }
    Ok(())
}

fn log_attempt(provider: &str, attempt: u32, outcome: &AttemptOutcome) {
    match outcome {
        AttemptOutcome::Success { rows } => debug!(provider, attempt, rows, "수집 성공"),
        AttemptOutcome::EmptyResult => debug!(provider, attempt, "데이터 없음"),
        AttemptOutcome::Timeout => warn!(provider, attempt, "시도 타임아웃"),
        AttemptOutcome::ProviderError { transient, message } => {
            warn!(provider, attempt, transient, error = %message, "제공자 에러")
        }
    }
}
