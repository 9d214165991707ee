//! 텐센트(腾讯) 시세 제공자.
//!
//! - 일/주/월봉: `fqkline` API (전일 기준 수정주가)
//! - 분봉: `mkline` API (최근 640개만 제공. 창이 요청 시작일을 포함할 때만 구간으로 필터링)
//! - 틱: `detail` 스크립트 응답을 페이지 단위로 수집 (당일 세션만 제공)

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use ashare_core::{
    BarRow, DataKind, FetchRequest, Market, Period, ProviderClient, ProviderError, ProviderReply,
    Row, TickRow, TradeSide,
};

use super::{get_text, is_weekend, lots_to_shares, parse_decimal, parse_optional_decimal};

const NAME: &str = "tencent";

/// 한 번에 요청하는 캔들 수 (API 최대치)
const KLINE_LIMIT: u32 = 640;

/// 틱 페이지 상한. 정상 세션은 수십 페이지 이내.
const MAX_TICK_PAGES: u32 = 300;

/// API 호스트.
#[derive(Debug, Clone)]
pub struct TencentEndpoints {
    /// 일/주/월봉
    pub kline_base: String,
    /// 분봉
    pub minute_base: String,
    /// 틱
    pub tick_base: String,
}

impl Default for TencentEndpoints {
    fn default() -> Self {
        Self {
            kline_base: "https://web.ifzq.gtimg.cn".to_string(),
            minute_base: "https://ifzq.gtimg.cn".to_string(),
            tick_base: "https://stock.gtimg.cn".to_string(),
        }
    }
}

impl TencentEndpoints {
    /// 모든 API를 한 호스트로 (테스트용).
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            kline_base: base.clone(),
            minute_base: base.clone(),
            tick_base: base,
        }
    }
}

/// 텐센트 클라이언트.
pub struct TencentClient {
    client: Client,
    endpoints: TencentEndpoints,
    session_override: Option<NaiveDate>,
}

impl TencentClient {
    pub fn new(client: Client) -> Self {
        Self::with_endpoints(client, TencentEndpoints::default())
    }

    pub fn with_endpoints(client: Client, endpoints: TencentEndpoints) -> Self {
        Self {
            client,
            endpoints,
            session_override: None,
        }
    }

    /// 당일 세션 날짜를 고정합니다.
    pub fn with_session_date(mut self, date: NaiveDate) -> Self {
        self.session_override = Some(date);
        self
    }

    fn session(&self) -> NaiveDate {
        self.session_override.unwrap_or_else(super::session_date)
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        let body = get_text(&self.client, url, query).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))?;

        match value.get("code").and_then(Value::as_i64) {
            Some(0) => Ok(value),
            code => Err(ProviderError::Parse(format!(
                "응답 코드 {:?}: {}",
                code,
                value.get("msg").and_then(Value::as_str).unwrap_or_default()
            ))),
        }
    }

    /// `data.<sh600000>` 객체.
    fn symbol_section<'a>(value: &'a Value, qualified: &str) -> Result<&'a Value, ProviderError> {
        value
            .get("data")
            .and_then(|data| data.get(qualified))
            .filter(|section| section.is_object())
            .ok_or_else(|| ProviderError::Mismatch(format!("응답에 {qualified} 없음")))
    }

    #[instrument(skip(self), fields(provider = NAME))]
    async fn fetch_daily_bars(
        &self,
        request: &FetchRequest,
        period: Period,
        span: &'static str,
    ) -> Result<ProviderReply, ProviderError> {
        let qualified = qualified(&request.symbol)?;
        let url = format!("{}/appstock/app/fqkline/get", self.endpoints.kline_base);
        let param = format!(
            "{},{},{},{},{},qfq",
            qualified,
            span,
            request.target.start().format("%Y-%m-%d"),
            request.target.end().format("%Y-%m-%d"),
            KLINE_LIMIT
        );

        let value = self.get_json(&url, &[("param", param)]).await?;
        let section = Self::symbol_section(&value, &qualified)?;
        let adjusted = format!("qfq{span}");
        let rows = section
            .get(adjusted.as_str())
            .or_else(|| section.get(span))
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::Parse(format!("{qualified} 응답에 {span} 배열 없음")))?;
        if rows.len() >= KLINE_LIMIT as usize {
            return Err(ProviderError::Unsupported(format!(
                "구간 캔들이 {KLINE_LIMIT}개 이상이라 잘렸을 수 있음: {request}"
            )));
        }

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row_fields(row)?;
            let trade_date = NaiveDate::parse_from_str(field(&fields, 0)?, "%Y-%m-%d")
                .map_err(|e| ProviderError::Parse(format!("kline 날짜: {e}")))?;
            if !request.target.contains(trade_date) {
                continue;
            }
            bars.push(bar_from_fields(&request.symbol, period, trade_date, None, &fields)?);
        }

        finish_bars(bars)
    }

    #[instrument(skip(self), fields(provider = NAME))]
    async fn fetch_minute_bars(
        &self,
        request: &FetchRequest,
        period: Period,
        span: &'static str,
    ) -> Result<ProviderReply, ProviderError> {
        let qualified = qualified(&request.symbol)?;
        let url = format!("{}/appstock/app/kline/mkline", self.endpoints.minute_base);
        let param = format!("{qualified},{span},,{KLINE_LIMIT}");

        let value = self.get_json(&url, &[("param", param)]).await?;
        let section = Self::symbol_section(&value, &qualified)?;
        let rows = section
            .get(span)
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::Parse(format!("{qualified} 응답에 {span} 배열 없음")))?;

        let mut earliest: Option<NaiveDate> = None;
        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row_fields(row)?;
            let at = NaiveDateTime::parse_from_str(field(&fields, 0)?, "%Y%m%d%H%M")
                .map_err(|e| ProviderError::Parse(format!("mkline 시각: {e}")))?;
            earliest = Some(earliest.map_or(at.date(), |d| d.min(at.date())));
            if !request.target.contains(at.date()) {
                continue;
            }
            bars.push(bar_from_fields(
                &request.symbol,
                period,
                at.date(),
                Some(at.time()),
                &fields,
            )?);
        }

        ensure_window_covers(request, earliest)?;
        finish_bars(bars)
    }

    #[instrument(skip(self), fields(provider = NAME))]
    async fn fetch_ticks(
        &self,
        request: &FetchRequest,
        date: NaiveDate,
    ) -> Result<ProviderReply, ProviderError> {
        if is_weekend(date) {
            return Ok(ProviderReply::NoData);
        }
        if date != self.session() {
            return Err(ProviderError::Unsupported(format!(
                "틱은 당일 세션만 제공: {date}"
            )));
        }

        let qualified = qualified(&request.symbol)?;
        let url = format!("{}/data/index.php", self.endpoints.tick_base);
        let mut ticks = Vec::new();

        for page in 0..MAX_TICK_PAGES {
            let query = [
                ("appn", "detail".to_string()),
                ("action", "data".to_string()),
                ("c", qualified.clone()),
                ("p", page.to_string()),
            ];
            let body = get_text(&self.client, &url, &query[..]).await?;
            let Some(records) = parse_detail_script(&body, &qualified)? else {
                if page == 0 {
                    return Err(ProviderError::Parse(format!(
                        "첫 페이지에 v_detail_data_{qualified} 없음"
                    )));
                }
                break;
            };
            if records.is_empty() {
                break;
            }
            for record in records.split('|').filter(|r| !r.trim().is_empty()) {
                ticks.push(parse_detail_record(&request.symbol, date, record)?);
            }

            if page + 1 == MAX_TICK_PAGES {
                warn!(symbol = %request.symbol, "틱 페이지 상한 도달");
            }
        }

        if ticks.is_empty() {
            return Ok(ProviderReply::NoData);
        }
        debug!(rows = ticks.len(), "틱 수신");
        Ok(ProviderReply::Rows(ticks.into_iter().map(Row::Tick).collect()))
    }
}

#[async_trait]
impl ProviderClient for TencentClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<ProviderReply, ProviderError> {
        match request.kind {
            DataKind::Tick => self.fetch_ticks(request, request.target.start()).await,
            DataKind::Bar(period) => match period {
                Period::Daily => self.fetch_daily_bars(request, period, "day").await,
                Period::Week => self.fetch_daily_bars(request, period, "week").await,
                Period::Month => self.fetch_daily_bars(request, period, "month").await,
                Period::Min1 => self.fetch_minute_bars(request, period, "m1").await,
                Period::Min5 => self.fetch_minute_bars(request, period, "m5").await,
                Period::Min15 => self.fetch_minute_bars(request, period, "m15").await,
                Period::Min30 => self.fetch_minute_bars(request, period, "m30").await,
                Period::Hour1 => self.fetch_minute_bars(request, period, "m60").await,
                Period::Min10 | Period::Quarter | Period::HalfYear | Period::Year => Err(
                    ProviderError::Unsupported(format!("주기: {period}")),
                ),
            },
        }
    }
}

/// `sh600000` 형식 코드.
fn qualified(symbol: &str) -> Result<String, ProviderError> {
    Market::from_code(symbol)
        .map(|market| format!("{}{}", market.as_str(), symbol))
        .ok_or_else(|| ProviderError::Unsupported(format!("종목코드: {symbol}")))
}

/// 최근 캔들 창이 요청 시작일 전체를 포함하는지 확인합니다.
///
/// 창의 첫 봉이 시작일보다 앞선 날이어야 시작일의 봉이 모두 들어 있다고 볼 수 있습니다.
/// 그렇지 않으면 빈 응답이나 일부 구간을 성공으로 돌려주지 않고 다음 제공자로 넘깁니다.
fn ensure_window_covers(
    request: &FetchRequest,
    earliest: Option<NaiveDate>,
) -> Result<(), ProviderError> {
    match earliest {
        Some(first) if first < request.target.start() => Ok(()),
        Some(first) => Err(ProviderError::Unsupported(format!(
            "최근 {KLINE_LIMIT}개 분봉이 {first}부터라 요청 시작일을 포함하지 못함: {request}"
        ))),
        None => Err(ProviderError::Unsupported(format!(
            "분봉 창이 비어 있어 구간을 확인할 수 없음: {request}"
        ))),
    }
}

fn finish_bars(bars: Vec<BarRow>) -> Result<ProviderReply, ProviderError> {
    if bars.is_empty() {
        return Ok(ProviderReply::NoData);
    }
    debug!(rows = bars.len(), "캔들 수신");
    Ok(ProviderReply::Rows(bars.into_iter().map(Row::Bar).collect()))
}

/// 캔들 배열 행. 문자열이 아닌 원소(배당 정보 객체 등)는 빈 값으로 취급합니다.
fn row_fields(row: &Value) -> Result<Vec<String>, ProviderError> {
    let items = row
        .as_array()
        .ok_or_else(|| ProviderError::Parse(format!("kline 행 형식: {row}")))?;
    Ok(items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        })
        .collect())
}

fn field(fields: &[String], index: usize) -> Result<&str, ProviderError> {
    fields
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| ProviderError::Parse(format!("kline 필드 {index} 없음")))
}

/// `[날짜, 시가, 종가, 고가, 저가, 거래량(手), ...]`
fn bar_from_fields(
    symbol: &str,
    period: Period,
    trade_date: NaiveDate,
    trade_time: Option<NaiveTime>,
    fields: &[String],
) -> Result<BarRow, ProviderError> {
    Ok(BarRow {
        symbol: symbol.to_string(),
        period,
        trade_date,
        trade_time,
        open: parse_decimal(field(fields, 1)?, "open")?,
        close: parse_decimal(field(fields, 2)?, "close")?,
        high: parse_decimal(field(fields, 3)?, "high")?,
        low: parse_decimal(field(fields, 4)?, "low")?,
        volume: lots_to_shares(field(fields, 5)?)?,
        amount: None,
        turnover_rate: None,
    })
}

/// `v_detail_data_sh600000=[페이지,"레코드|레코드"];`
///
/// 변수 선언이 없으면 `None`. 첫 페이지가 아니면 더 이상 페이지가 없다는 뜻입니다.
fn parse_detail_script(body: &str, qualified: &str) -> Result<Option<String>, ProviderError> {
    let Some((name, payload)) = body.trim().split_once('=') else {
        return Ok(None);
    };
    let expected = format!("v_detail_data_{qualified}");
    if name.trim() != expected {
        return Err(ProviderError::Mismatch(format!(
            "요청 {expected} / 응답 {}",
            name.trim()
        )));
    }

    let payload = payload.trim().trim_end_matches(';');
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ProviderError::Parse(format!("detail: {e}")))?;
    Ok(value
        .as_array()
        .and_then(|items| items.get(1))
        .and_then(Value::as_str)
        .map(str::to_string))
}

/// `순번/시각/가격/변동/거래량(手)/거래대금/방향(B|S|M)`
fn parse_detail_record(symbol: &str, date: NaiveDate, record: &str) -> Result<TickRow, ProviderError> {
    let fields: Vec<&str> = record.split('/').collect();
    if fields.len() < 7 {
        return Err(ProviderError::Parse(format!("detail 필드 부족: {record:?}")));
    }

    let trade_time = NaiveTime::parse_from_str(fields[1], "%H:%M:%S")
        .map_err(|e| ProviderError::Parse(format!("detail 시각 {:?}: {e}", fields[1])))?;

    Ok(TickRow {
        symbol: symbol.to_string(),
        trade_date: date,
        trade_time,
        price: parse_decimal(fields[2], "price")?,
        volume: lots_to_shares(fields[4])?,
        trade_type: match fields[6].trim() {
            "B" => TradeSide::Buy,
            "S" => TradeSide::Sell,
            _ => TradeSide::Neutral,
        },
        price_change: parse_optional_decimal(fields[3], "change")?,
        amount: parse_optional_decimal(fields[5], "amount")?,
    })
}
