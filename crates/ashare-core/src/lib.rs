//! A-share 데이터 수집기 도메인 타입.
//!
//! 수집 파이프라인 전체에서 공유하는 값 타입과 데이터 제공자 계약을 정의합니다.
//!
//! - [`Symbol`], [`Market`]: 종목 식별자
//! - [`Period`]: 캔들 주기 열거형
//! - [`FetchRequest`]: 수집 작업 단위 (재시도/페일오버 키)
//! - [`Row`], [`TickRow`], [`BarRow`]: 정제된 행과 자연 키
//! - [`ProviderClient`], [`SymbolDirectory`]: 업스트림 제공자 trait

pub mod period;
pub mod provider;
pub mod request;
pub mod row;
pub mod symbol;

pub use period::{ParsePeriodError, Period};
pub use provider::{ProviderClient, ProviderError, ProviderReply, SymbolDirectory};
pub use request::{DataKind, DateTarget, FetchRequest};
pub use row::{BarRow, Row, RowKey, TableTarget, TickRow, TradeSide};
pub use symbol::{Market, Symbol};
