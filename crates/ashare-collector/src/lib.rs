//! A주 시세 일괄 수집기.
//!
//! 수천 개 종목의 틱과 캔들을 여러 업스트림 제공자에서 수집하여
//! 자연 키 기반 UPSERT로 저장합니다.
//!
//! - [`modules::FailoverFetcher`]: 타임아웃 + 재시도 + 제공자 페일오버
//! - [`modules::TaskScheduler`]: 고정 크기 워커 풀, 작업 단위 격리
//! - [`modules::BatchPersister`]: 청크 단위 멱등 일괄 저장
//! - [`modules::BatchCoordinator`]: 종목 동기화 → 틱 → 캔들 → 저장 마무리
//! - [`report::BatchRunReport`]: 실행 리포트

pub mod config;
pub mod error;
pub mod modules;
pub mod report;
pub mod retry;

pub use config::{CollectorConfig, ProviderKind};
pub use error::{CollectorError, Result};
pub use report::{BatchRunReport, FailedRequest, PhaseReport, ProviderUsage};
