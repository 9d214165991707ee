//! 업스트림 데이터 제공자 추상화.
//!
//! 구체 제공자(동방재부, 텐센트 등)는 우선순위 순서로 나열되어
//! 페일오버 수집기가 명시적으로 순회합니다.

use async_trait::async_trait;
use thiserror::Error;

use crate::{FetchRequest, Row, Symbol};

/// 제공자 호출 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderReply {
    /// 정상 응답 행
    Rows(Vec<Row>),
    /// 응답은 유효하지만 데이터가 없음 (휴장일 등).
    /// 에러와 명확히 구분되는 신호여야 합니다.
    NoData,
}

/// 제공자 에러.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// 연결 실패, 응답 중단 등 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// HTTP 상태 코드 에러
    #[error("HTTP 상태 에러: {0}")]
    Status(u16),

    /// 응답 형식 에러
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 요청과 다른 종목/날짜/주기가 응답됨
    #[error("응답 불일치: {0}")]
    Mismatch(String),

    /// 제공자가 지원하지 않는 요청
    #[error("지원하지 않는 요청: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// 같은 제공자에서 재시도할 가치가 있는 일시적 에러인지 여부.
    ///
    /// 형식/불일치/미지원 에러는 재시도해도 결과가 같으므로 즉시 다음 제공자로 넘어갑니다.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status(code) => *code == 429 || (500..600).contains(code),
            Self::Parse(_) | Self::Mismatch(_) | Self::Unsupported(_) => false,
        }
    }
}

/// 단일 종목/요청에 대한 네트워크 호출 1회를 수행하는 제공자.
///
/// 응답 행에는 요청 종목과 날짜가 그대로 실려 있어야 하며(검증용),
/// 데이터 부재는 [`ProviderReply::NoData`]로 에러와 구분해야 합니다.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// 제공자 이름 (로그, 사용량 집계 키).
    fn name(&self) -> &str;

    /// 요청 1건 조회.
    ///
    /// # Errors
    ///
    /// - `ProviderError::Network`: 연결 실패
    /// - `ProviderError::Parse`: 응답 형식 오류
    /// - `ProviderError::Unsupported`: 지원하지 않는 주기/날짜
    async fn fetch(&self, request: &FetchRequest) -> Result<ProviderReply, ProviderError>;
}

/// 전체 상장 종목 목록 제공자.
#[async_trait]
pub trait SymbolDirectory: Send + Sync {
    fn name(&self) -> &str;

    async fn list_symbols(&self) -> Result<Vec<Symbol>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Status(503).is_transient());
        assert!(ProviderError::Status(429).is_transient());
        assert!(!ProviderError::Status(404).is_transient());
        assert!(!ProviderError::Parse("bad json".into()).is_transient());
        assert!(!ProviderError::Mismatch("symbol".into()).is_transient());
    }
}
