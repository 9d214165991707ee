//! 업스트림 데이터 제공자와 PostgreSQL 저장소.
//!
//! - [`provider`]: 동방재부/텐센트 HTTP 제공자 ([`ashare_core::ProviderClient`] 구현)
//! - [`storage`]: 자연 키 기반 일괄 UPSERT 저장소 ([`RowStore`])
//! - [`database`]: 커넥션 풀 설정

pub mod database;
pub mod error;
pub mod provider;
pub mod storage;

pub use database::{Database, DatabaseConfig};
pub use error::{Result, StoreError};
pub use provider::{
    build_http_client, session_date, EastmoneyClient, EastmoneyEndpoints, TencentClient,
    TencentEndpoints,
};
pub use storage::{MemoryRowStore, PgRowStore, RowStore, UpsertCount};
