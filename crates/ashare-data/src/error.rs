//! 저장소 에러 타입.

use thiserror::Error;

/// 저장소 에러.
#[derive(Debug, Error)]
pub enum StoreError {
    /// 데이터베이스 에러 (연결 끊김, 제약 위반 등)
    #[error("데이터베이스 에러: {0}")]
    Database(#[from] sqlx::Error),

    /// 테스트/드라이런 저장소에서 주입된 실패
    #[error("주입된 저장 실패: {0}")]
    Injected(String),

    /// 잘못된 테이블/행 조합
    #[error("잘못된 테이블: {0}")]
    InvalidTable(String),
}

impl StoreError {
    /// 짧은 지연 후 같은 청크를 다시 쓸 가치가 있는지 여부.
    ///
    /// 제약 위반과 연결 끊김 모두 재시도 대상이며, 행/테이블 구성 오류만 제외합니다.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidTable(_))
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, StoreError>;
