//! 일괄 실행 리포트.
//!
//! 실행 1회마다 하나의 [`BatchRunReport`]가 만들어지며, CLI가 JSON 파일로 저장합니다.
//! 실행 종료 시점에 `succeeded + failed == total_requested`가 항상 성립합니다.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use ashare_core::FetchRequest;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::warn;

use crate::{
    modules::{
        outcome::{
            AttemptOutcome, FailureClass, FailureReason, FetchAttempt, FetchOutcome, Resolution,
        },
        persister::{PersistFailure, PersistStats},
        symbol_sync::SymbolRefreshReport,
        RunPhase,
    },
    Result,
};

/// 실패한 요청 (분류, 사유, 시도 기록 포함).
#[derive(Debug, Clone, Serialize)]
pub struct FailedRequest {
    pub request: FetchRequest,
    pub class: FailureClass,
    pub reason: FailureReason,
    pub attempts: Vec<FetchAttempt>,
}

/// 제공자별 사용량.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderUsage {
    pub attempts: usize,
    pub successes: usize,
    pub empty: usize,
    pub timeouts: usize,
    pub errors: usize,
}

/// 수집 단계 요약.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requested: usize,
    /// 수집 성공 수 (저장 실패 반영 전)
    pub fetched: usize,
    pub failed: usize,
    pub rows: usize,
}

/// 일괄 실행 리포트.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRunReport {
    /// 실행 종류 (symbols, tick, bars, all)
    pub kind: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_phase: RunPhase,
    pub total_requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows_fetched: usize,
    pub failed_requests: Vec<FailedRequest>,
    pub provider_usage: BTreeMap<String, ProviderUsage>,
    pub phases: Vec<PhaseReport>,
    pub symbol_refresh: Option<SymbolRefreshReport>,
    pub persistence: PersistStats,
    /// 단계 전체를 중단시킨 실패
    pub failure_note: Option<String>,
}

impl BatchRunReport {
    /// 성공률 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total_requested == 0 {
            0.0
        } else {
            (self.succeeded as f64 / self.total_requested as f64) * 100.0
        }
    }

    /// 분류별 실패 수.
    pub fn failures_by_class(&self) -> BTreeMap<FailureClass, usize> {
        let mut counts = BTreeMap::new();
        for failed in &self.failed_requests {
            *counts.entry(failed.class).or_insert(0) += 1;
        }
        counts
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        let elapsed = (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default();

        tracing::info!(
            operation = operation,
            total = self.total_requested,
            succeeded = self.succeeded,
            failed = self.failed,
            rows = self.rows_fetched,
            inserted = self.persistence.rows_inserted,
            updated = self.persistence.rows_updated,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", elapsed.as_secs_f64()),
            "수집 완료"
        );

        for (provider, usage) in &self.provider_usage {
            tracing::info!(
                provider = %provider,
                attempts = usage.attempts,
                successes = usage.successes,
                empty = usage.empty,
                timeouts = usage.timeouts,
                errors = usage.errors,
                "제공자 사용량"
            );
        }

        if self.failed > 0 {
            tracing::warn!(by_class = ?self.failures_by_class(), "실패 요청 분류");
        }
        if let Some(note) = &self.failure_note {
            tracing::error!(note = %note, "실행 중단");
        }
    }

    /// `<dir>/<kind>_batch_report_<timestamp>.json`으로 저장하고 경로를 반환합니다.
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let stamp = self.started_at.with_timezone(&Local).format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_batch_report_{}.json", self.kind, stamp));
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// 리포트 집계기.
pub(crate) struct ReportBuilder {
    kind: String,
    started_at: DateTime<Utc>,
    total_requested: usize,
    succeeded: usize,
    rows_fetched: usize,
    /// 수집 성공 요청의 시도 기록 (저장 실패 시 실패 항목으로 옮김)
    fetched_attempts: HashMap<FetchRequest, Vec<FetchAttempt>>,
    failed_requests: Vec<FailedRequest>,
    provider_usage: BTreeMap<String, ProviderUsage>,
    phases: Vec<PhaseReport>,
    symbol_refresh: Option<SymbolRefreshReport>,
    failure_note: Option<String>,
}

impl ReportBuilder {
    pub(crate) fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            started_at: Utc::now(),
            total_requested: 0,
            succeeded: 0,
            rows_fetched: 0,
            fetched_attempts: HashMap::new(),
            failed_requests: Vec::new(),
            provider_usage: BTreeMap::new(),
            phases: Vec::new(),
            symbol_refresh: None,
            failure_note: None,
        }
    }

    pub(crate) fn symbol_refresh(&mut self, report: SymbolRefreshReport) {
        self.symbol_refresh = Some(report);
    }

    pub(crate) fn failure_note(&mut self, note: impl Into<String>) {
        self.failure_note = Some(note.into());
    }

    /// 한 단계의 결과 집계.
    pub(crate) fn record_phase(
        &mut self,
        phase: RunPhase,
        started_at: DateTime<Utc>,
        outcomes: Vec<FetchOutcome>,
    ) {
        let mut summary = PhaseReport {
            phase,
            started_at,
            finished_at: Utc::now(),
            requested: outcomes.len(),
            fetched: 0,
            failed: 0,
            rows: 0,
        };

        for outcome in outcomes {
            for attempt in &outcome.attempts {
                let usage = self.provider_usage.entry(attempt.provider.clone()).or_default();
                usage.attempts += 1;
                match attempt.outcome {
                    AttemptOutcome::Success { .. } => usage.successes += 1,
                    AttemptOutcome::EmptyResult => usage.empty += 1,
                    AttemptOutcome::Timeout => usage.timeouts += 1,
                    AttemptOutcome::ProviderError { .. } => usage.errors += 1,
                }
            }

            match outcome.resolution {
                Resolution::Fetched(_) => {
                    summary.fetched += 1;
                    summary.rows += outcome.row_count;
                    self.succeeded += 1;
                    self.rows_fetched += outcome.row_count;
                    self.fetched_attempts.insert(outcome.request, outcome.attempts);
                }
                Resolution::Failed(reason) => {
                    summary.failed += 1;
                    self.failed_requests.push(FailedRequest {
                        request: outcome.request,
                        class: reason.class(),
                        reason,
                        attempts: outcome.attempts,
                    });
                }
            }
        }

        self.total_requested += summary.requested;
        self.phases.push(summary);
    }

    /// 저장 실패 반영: 수집 성공으로 집계된 요청을 실패로 옮깁니다.
    pub(crate) fn record_persistence_failures(&mut self, failures: Vec<PersistFailure>) {
        for failure in failures {
            let Some(attempts) = self.fetched_attempts.remove(&failure.request) else {
                warn!(request = %failure.request, "수집 성공 기록이 없는 저장 실패");
                continue;
            };
            self.succeeded -= 1;
            self.failed_requests.push(FailedRequest {
                request: failure.request,
                class: FailureClass::Persistence,
                reason: FailureReason::Persistence {
                    message: format!("{}: {}", failure.table, failure.message),
                },
                attempts,
            });
        }
    }

    pub(crate) fn finish(self, final_phase: RunPhase, persistence: PersistStats) -> BatchRunReport {
        BatchRunReport {
            kind: self.kind,
            started_at: self.started_at,
            finished_at: Utc::now(),
            final_phase,
            total_requested: self.total_requested,
            succeeded: self.succeeded,
            failed: self.failed_requests.len(),
            rows_fetched: self.rows_fetched,
            failed_requests: self.failed_requests,
            provider_usage: self.provider_usage,
            phases: self.phases,
            symbol_refresh: self.symbol_refresh,
            persistence,
            failure_note: self.failure_note,
        }
    }
}
