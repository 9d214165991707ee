//! 저장 재시도 유틸리티.
//!
//! 청크 쓰기처럼 같은 작업을 그대로 다시 실행해도 안전한(멱등) 작업에 사용합니다.
//!
//! # 예시
//!
//! ```rust,ignore
//! let config = RetryConfig::constant(3, Duration::from_millis(500));
//! let count = with_retry(&config, || store.upsert(&target, &rows)).await?;
//! ```

use std::{fmt::Display, future::Future, time::Duration};

use ashare_data::StoreError;
use tracing::{debug, warn};

/// 재시도 가능 여부를 판단할 수 있는 에러.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        StoreError::is_retryable(self)
    }
}

/// 재시도 설정 (고정 간격).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 시도 횟수 (초기 시도 포함, 최소 1).
    pub max_attempts: u32,
    /// 실패 후 다음 시도까지 대기 시간.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::constant(3, Duration::from_millis(500))
    }
}

impl RetryConfig {
    /// 고정 간격 재시도.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// 재시도가 포함된 비동기 작업 실행.
///
/// 재시도 불가능한 에러는 즉시, 그 외 에러는 `max_attempts`번 시도 후 마지막 에러를 반환합니다.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempts = attempt, "재시도 후 성공");
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_retryable() {
                    warn!(error = %e, "재시도 불가능한 에러, 즉시 실패 반환");
                    return Err(e);
                }

                if attempt >= max_attempts {
                    warn!(
                        error = %e,
                        attempts = attempt,
                        "최대 시도 횟수 초과"
                    );
                    return Err(e);
                }

                let delay = config.delay;
                warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "재시도 대기 중"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
