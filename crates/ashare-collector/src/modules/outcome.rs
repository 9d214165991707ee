//! 수집 시도와 최종 결과.
//!
//! 결과는 한 번 만들어지면 종결 상태이며, 실패 사유는 리포트에 그대로 실립니다.

use std::fmt;

use ashare_core::{FetchRequest, Row};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 시도 1회의 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// 검증을 통과한 행 수신
    Success { rows: usize },
    /// 시도 타임아웃
    Timeout,
    /// 제공자 에러
    ProviderError { transient: bool, message: String },
    /// 데이터 없음 (휴장일 등)
    EmptyResult,
}

/// 제공자 호출 1회 기록.
#[derive(Debug, Clone, Serialize)]
pub struct FetchAttempt {
    /// 우선순위 (0부터)
    pub provider_rank: usize,
    pub provider: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
}

/// 리포트용 실패 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// 타임아웃/연결 에러만 발생
    Network,
    /// 응답 형식/불일치/미지원 등 업스트림 의미 에러
    Upstream,
    /// 네트워크와 업스트림 에러 혼재
    Mixed,
    /// 수집은 성공했으나 저장 실패
    Persistence,
    /// 작업 패닉/유실
    Internal,
}

/// 최종 실패 사유.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    /// 모든 시도가 타임아웃
    AllTimedOut,
    /// 모든 시도가 에러
    AllErrored { transient: bool, last_error: String },
    /// 타임아웃과 에러 혼재
    Mixed {
        timeouts: usize,
        errors: usize,
        last_error: Option<String>,
    },
    /// 등록된 제공자 없음
    NoProviders,
    /// 작업 중 패닉
    TaskPanicked { message: String },
    /// 워커 풀 종료 후에도 결과가 없는 작업
    TaskLost,
    /// 청크 저장 최종 실패
    Persistence { message: String },
}

impl FailureReason {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::AllTimedOut => FailureClass::Network,
            Self::AllErrored { transient: true, .. } => FailureClass::Network,
            Self::AllErrored { transient: false, .. } => FailureClass::Upstream,
            Self::Mixed { .. } => FailureClass::Mixed,
            Self::Persistence { .. } => FailureClass::Persistence,
            Self::NoProviders | Self::TaskPanicked { .. } | Self::TaskLost => FailureClass::Internal,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllTimedOut => write!(f, "모든 시도 타임아웃"),
            Self::AllErrored { last_error, .. } => write!(f, "모든 시도 실패: {last_error}"),
            Self::Mixed {
                timeouts,
                errors,
                last_error,
            } => write!(
                f,
                "타임아웃 {timeouts}회, 에러 {errors}회 (마지막: {})",
                last_error.as_deref().unwrap_or("-")
            ),
            Self::NoProviders => write!(f, "등록된 제공자 없음"),
            Self::TaskPanicked { message } => write!(f, "작업 패닉: {message}"),
            Self::TaskLost => write!(f, "작업 결과 유실"),
            Self::Persistence { message } => write!(f, "저장 실패: {message}"),
        }
    }
}

/// 요청의 최종 상태.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// 수집 성공 (행이 없을 수 있음)
    Fetched(Vec<Row>),
    /// 최종 실패
    Failed(FailureReason),
}

/// 요청 1건의 종결 결과.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub request: FetchRequest,
    pub resolution: Resolution,
    /// 시도 기록 (시간 순)
    pub attempts: Vec<FetchAttempt>,
    /// 수집된 행 수. 행을 저장소로 넘긴 뒤에도 유지됩니다.
    pub row_count: usize,
}

impl FetchOutcome {
    pub fn fetched(request: FetchRequest, rows: Vec<Row>, attempts: Vec<FetchAttempt>) -> Self {
        Self {
            request,
            row_count: rows.len(),
            resolution: Resolution::Fetched(rows),
            attempts,
        }
    }

    pub fn failed(request: FetchRequest, reason: FailureReason, attempts: Vec<FetchAttempt>) -> Self {
        Self {
            request,
            resolution: Resolution::Failed(reason),
            attempts,
            row_count: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.resolution, Resolution::Fetched(_))
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.resolution {
            Resolution::Failed(reason) => Some(reason),
            Resolution::Fetched(_) => None,
        }
    }

    /// 행을 꺼냅니다. 실패 결과이거나 이미 꺼냈으면 빈 목록.
    pub fn take_rows(&mut self) -> Vec<Row> {
        match &mut self.resolution {
            Resolution::Fetched(rows) => std::mem::take(rows),
            Resolution::Failed(_) => Vec::new(),
        }
    }
}

/// 시도 기록에서 최종 실패 사유 도출.
pub(crate) fn summarize_failure(attempts: &[FetchAttempt]) -> FailureReason {
    let mut timeouts = 0;
    let mut errors = 0;
    let mut all_transient = true;
    let mut last_error = None;

    for attempt in attempts {
        match &attempt.outcome {
            AttemptOutcome::Timeout => timeouts += 1,
            AttemptOutcome::ProviderError { transient, message } => {
                errors += 1;
                all_transient &= *transient;
                last_error = Some(format!("{}: {}", attempt.provider, message));
            }
            AttemptOutcome::Success { .. } | AttemptOutcome::EmptyResult => {}
        }
    }

    match (timeouts, errors, last_error) {
        (0, 0, _) => FailureReason::NoProviders,
        (_, 0, _) => FailureReason::AllTimedOut,
        (0, _, Some(last_error)) => FailureReason::AllErrored {
            transient: all_transient,
            last_error,
        },
        (timeouts, errors, last_error) => FailureReason::Mixed {
            timeouts,
            errors,
            last_error,
        },
    }
}
