//! 에러 타입 정의.

use ashare_core::ProviderError;
use ashare_data::StoreError;
use thiserror::Error;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 저장소 에러
    #[error("저장소 에러: {0}")]
    Store(#[from] StoreError),

    /// 데이터 소스 에러 (동방재부, 텐센트 등)
    #[error("데이터 소스 에러: {0}")]
    DataSource(String),

    /// 리포트 파일 입출력 에러
    #[error("입출력 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 리포트 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ProviderError> for CollectorError {
    fn from(err: ProviderError) -> Self {
        Self::DataSource(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
