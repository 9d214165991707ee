//! 커넥션 풀 설정.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::Result;

/// 커넥션 풀 설정.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl DatabaseConfig {
    /// 수집기용 설정.
    ///
    /// 모든 워커가 동시에 쓰기를 수행해도 조회 쪽이 굶지 않도록
    /// 풀 크기를 워커 수의 2배로 잡습니다.
    pub fn for_collector(url: impl Into<String>, concurrency: usize) -> Self {
        let max_connections = u32::try_from(concurrency.max(1) * 2).unwrap_or(u32::MAX);
        Self {
            url: url.into(),
            max_connections,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// PostgreSQL 연결.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 풀을 생성하고 연결을 확인합니다.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "데이터베이스 연결 완료"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
