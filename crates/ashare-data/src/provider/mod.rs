//! 업스트림 HTTP 제공자.
//!
//! | 제공자 | 캔들 | 틱 | 종목 목록 |
//! |--------|------|----|-----------|
//! | [`EastmoneyClient`] | 1/5/15/30/60분, 일/주/월/분기/반기/년 | 당일 세션 | O |
//! | [`TencentClient`] | 1/5/15/30/60분, 일/주/월 | 당일 세션 | X |
//!
//! 거래량은 모두 주 단위로 변환합니다 (업스트림은 100주 단위 "手").

mod eastmoney;
mod tencent;

use std::{str::FromStr, time::Duration};

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Asia::Shanghai;
use reqwest::Client;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::Serialize;
use tracing::debug;

use ashare_core::ProviderError;

pub use eastmoney::{EastmoneyClient, EastmoneyEndpoints};
pub use tencent::{TencentClient, TencentEndpoints};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// 1手 = 100주
const SHARES_PER_LOT: i64 = 100;

/// 제공자 공용 HTTP 클라이언트.
///
/// 요청 단위 타임아웃은 페일오버 수집기가 관리하므로 여기서는 연결 타임아웃만 설정합니다.
pub fn build_http_client(connect_timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(connect_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| ProviderError::Network(e.to_string()))
}

/// 상하이 기준 오늘 날짜 (당일 세션).
pub fn session_date() -> NaiveDate {
    Utc::now().with_timezone(&Shanghai).date_naive()
}

/// 주말 여부. 주말에는 세션이 없으므로 네트워크 호출 없이 `NoData`로 처리합니다.
pub(crate) fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub(crate) fn classify(err: reqwest::Error) -> ProviderError {
    match err.status() {
        Some(status) => ProviderError::Status(status.as_u16()),
        None if err.is_decode() => ProviderError::Parse(err.to_string()),
        None => ProviderError::Network(err.to_string()),
    }
}

/// GET 후 본문 텍스트 반환. 2xx 외 상태는 `ProviderError::Status`.
pub(crate) async fn get_text<Q>(client: &Client, url: &str, query: &Q) -> Result<String, ProviderError>
where
    Q: Serialize + ?Sized,
{
    debug!(url, "업스트림 요청");
    let response = client.get(url).query(query).send().await.map_err(classify)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }

    response.text().await.map_err(classify)
}

pub(crate) fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, ProviderError> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| ProviderError::Parse(format!("{field}: {raw:?}")))
}

/// 빈 값이나 "-"는 `None`.
pub(crate) fn parse_optional_decimal(raw: &str, field: &str) -> Result<Option<Decimal>, ProviderError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return Ok(None);
    }
    parse_decimal(raw, field).map(Some)
}

/// "手" 단위 거래량을 주 단위로 변환.
pub(crate) fn lots_to_shares(raw: &str) -> Result<i64, ProviderError> {
    parse_decimal(raw, "volume")?
        .trunc()
        .to_i64()
        .and_then(|lots| lots.checked_mul(SHARES_PER_LOT))
        .ok_or_else(|| ProviderError::Parse(format!("volume: {raw:?}")))
}
