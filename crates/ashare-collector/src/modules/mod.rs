//! 수집 파이프라인 모듈.
//!
//! 조정기 → 스케줄러 → 페일오버 수집기 → 행 → 저장기 → 저장소 순서로 흐르며,
//! 실패는 타입이 있는 결과로 조정기의 리포트까지 돌아옵니다.

pub mod coordinator;
pub mod fetcher;
pub mod outcome;
pub mod persister;
pub(crate) mod progress;
pub mod scheduler;
pub mod symbol_sync;

pub use coordinator::{BarPlan, BatchCoordinator, RunPhase, RunPlan};
pub use fetcher::{FailoverFetcher, FetchPolicy};
pub use outcome::{
    AttemptOutcome, FailureClass, FailureReason, FetchAttempt, FetchOutcome, Resolution,
};
pub use persister::{BatchPersister, PersistFailure, PersistPolicy, PersistStats};
pub use scheduler::{DiscardSink, OutcomeSink, TaskScheduler};
pub use symbol_sync::{filter_symbols, sync_symbols, SymbolRefreshReport, SymbolSync};
