//! 동방재부(東方財富) 시세 제공자.
//!
//! - 캔들: `push2his` kline API (`klt` 주기 코드, 전일 기준 수정주가)
//! - 틱: `push2` details API (당일 세션만 제공)
//! - 종목 목록: `push2` clist API (페이지 단위)

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, instrument};

use ashare_core::{
    BarRow, DataKind, FetchRequest, Market, Period, ProviderClient, ProviderError, ProviderReply,
    Row, Symbol, SymbolDirectory, TickRow, TradeSide,
};

use super::{get_text, is_weekend, lots_to_shares, parse_decimal, parse_optional_decimal};

const NAME: &str = "eastmoney";

/// 종목 목록 페이지 크기.
const CLIST_PAGE_SIZE: usize = 500;

/// 상하이 주판/과창판 + 선전 주판/창업판
const CLIST_FILTER: &str = "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23";

/// API 호스트.
#[derive(Debug, Clone)]
pub struct EastmoneyEndpoints {
    /// 캔들 (`push2his`)
    pub history_base: String,
    /// 틱, 종목 목록 (`push2`)
    pub quote_base: String,
}

impl Default for EastmoneyEndpoints {
    fn default() -> Self {
        Self {
            history_base: "https://push2his.eastmoney.com".to_string(),
            quote_base: "https://push2.eastmoney.com".to_string(),
        }
    }
}

impl EastmoneyEndpoints {
    /// 모든 API를 한 호스트로 (테스트용).
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            history_base: base.clone(),
            quote_base: base,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    code: String,
    #[serde(default)]
    klines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DetailData {
    code: String,
    #[serde(default)]
    details: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClistData {
    total: usize,
    #[serde(default)]
    diff: Vec<ClistItem>,
}

#[derive(Debug, Deserialize)]
struct ClistItem {
    /// 종목코드
    f12: String,
    /// 종목명
    f14: String,
}

/// 동방재부 클라이언트.
pub struct EastmoneyClient {
    client: Client,
    endpoints: EastmoneyEndpoints,
    /// 당일 세션 날짜 고정 (테스트용)
    session_override: Option<NaiveDate>,
}

impl EastmoneyClient {
    pub fn new(client: Client) -> Self {
        Self::with_endpoints(client, EastmoneyEndpoints::default())
    }

    pub fn with_endpoints(client: Client, endpoints: EastmoneyEndpoints) -> Self {
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

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope<T>, ProviderError> {
        let body = get_text(&self.client, url, query).await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))
    }

    #[instrument(skip(self), fields(provider = NAME))]
    async fn fetch_bars(
        &self,
        request: &FetchRequest,
        period: Period,
    ) -> Result<ProviderReply, ProviderError> {
        let klt = kline_type(period)?;
        let secid = secid(&request.symbol)?;
        let url = format!("{}/api/qt/stock/kline/get", self.endpoints.history_base);
        let query = [
            ("secid", secid),
            ("fields1", "f1,f2,f3,f4,f5,f6".to_string()),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61".to_string()),
            ("klt", klt.to_string()),
            ("fqt", "1".to_string()),
            ("beg", request.target.start().format("%Y%m%d").to_string()),
            ("end", request.target.end().format("%Y%m%d").to_string()),
        ];

        let envelope: Envelope<KlineData> = self.get_json(&url, &query).await?;
        let data = envelope
            .data
            .ok_or_else(|| ProviderError::Mismatch(format!("{} 응답 데이터 없음", request.symbol)))?;
        if data.code != request.symbol {
            return Err(ProviderError::Mismatch(format!(
                "요청 {} / 응답 {}",
                request.symbol, data.code
            )));
        }
        if data.klines.is_empty() {
            return Ok(ProviderReply::NoData);
        }

        let rows = data
            .klines
            .iter()
            .map(|line| parse_kline(&request.symbol, period, line).map(Row::Bar))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(rows = rows.len(), "캔들 수신");
        Ok(ProviderReply::Rows(rows))
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

        let url = format!("{}/api/qt/stock/details/get", self.endpoints.quote_base);
        let query = [
            ("secid", secid(&request.symbol)?),
            ("fields1", "f1,f2,f3,f4".to_string()),
            ("fields2", "f51,f52,f53,f54,f55".to_string()),
            ("pos", "-0".to_string()),
        ];

        let envelope: Envelope<DetailData> = self.get_json(&url, &query).await?;
        let data = envelope
            .data
            .ok_or_else(|| ProviderError::Mismatch(format!("{} 응답 데이터 없음", request.symbol)))?;
        if data.code != request.symbol {
            return Err(ProviderError::Mismatch(format!(
                "요청 {} / 응답 {}",
                request.symbol, data.code
            )));
        }
        if data.details.is_empty() {
            return Ok(ProviderReply::NoData);
        }

        let ticks = parse_details(&request.symbol, date, &data.details)?;
        debug!(rows = ticks.len(), "틱 수신");
        Ok(ProviderReply::Rows(ticks.into_iter().map(Row::Tick).collect()))
    }
}

#[async_trait]
impl ProviderClient for EastmoneyClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<ProviderReply, ProviderError> {
        match request.kind {
            DataKind::Bar(period) => self.fetch_bars(request, period).await,
            DataKind::Tick => self.fetch_ticks(request, request.target.start()).await,
        }
    }
}

#[async_trait]
impl SymbolDirectory for EastmoneyClient {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip(self), fields(provider = NAME))]
    async fn list_symbols(&self) -> Result<Vec<Symbol>, ProviderError> {
        let url = format!("{}/api/qt/clist/get", self.endpoints.quote_base);
        let mut symbols = Vec::new();
        let mut page = 1usize;

        loop {
            let query = [
                ("pn", page.to_string()),
                ("pz", CLIST_PAGE_SIZE.to_string()),
                ("po", "1".to_string()),
                ("np", "1".to_string()),
                ("fltt", "2".to_string()),
                ("invt", "2".to_string()),
                ("fid", "f12".to_string()),
                ("fs", CLIST_FILTER.to_string()),
                ("fields", "f12,f13,f14".to_string()),
            ];
            let envelope: Envelope<ClistData> = self.get_json(&url, &query).await?;
            let Some(data) = envelope.data else { break };
            if data.diff.is_empty() {
                break;
            }

            symbols.extend(
                data.diff
                    .into_iter()
                    .filter_map(|item| Symbol::new(item.f12, item.f14.trim())),
            );

            if page * CLIST_PAGE_SIZE >= data.total {
                break;
            }
            page += 1;
        }

        debug!(count = symbols.len(), pages = page, "종목 목록 수신");
        Ok(symbols)
    }
}

/// 시장 구분 + 종목코드 (`1.600000`, `0.000001`).
fn secid(symbol: &str) -> Result<String, ProviderError> {
    match Market::from_code(symbol) {
        Some(Market::Sh) => Ok(format!("1.{symbol}")),
        Some(Market::Sz) => Ok(format!("0.{symbol}")),
        None => Err(ProviderError::Unsupported(format!("종목코드: {symbol}"))),
    }
}

fn kline_type(period: Period) -> Result<&'static str, ProviderError> {
    match period {
        Period::Min1 => Ok("1"),
        Period::Min5 => Ok("5"),
        Period::Min15 => Ok("15"),
        Period::Min30 => Ok("30"),
        Period::Hour1 => Ok("60"),
        Period::Daily => Ok("101"),
        Period::Week => Ok("102"),
        Period::Month => Ok("103"),
        Period::Quarter => Ok("104"),
        Period::HalfYear => Ok("105"),
        Period::Year => Ok("106"),
        Period::Min10 => Err(ProviderError::Unsupported(format!("주기: {period}"))),
    }
}

/// `날짜[ 시각],시가,종가,고가,저가,거래량(手),거래대금,진폭,등락률,등락액,회전율`
fn parse_kline(symbol: &str, period: Period, line: &str) -> Result<BarRow, ProviderError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 7 {
        return Err(ProviderError::Parse(format!("kline 필드 부족: {line:?}")));
    }

    let (trade_date, trade_time) = match fields[0].split_once(' ') {
        Some(_) => {
            let at = NaiveDateTime::parse_from_str(fields[0], "%Y-%m-%d %H:%M")
                .map_err(|e| ProviderError::Parse(format!("kline 시각 {:?}: {e}", fields[0])))?;
            (at.date(), Some(at.time()))
        }
        None => {
            let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d")
                .map_err(|e| ProviderError::Parse(format!("kline 날짜 {:?}: {e}", fields[0])))?;
            (date, None)
        }
    };
    if period.is_intraday() != trade_time.is_some() {
        return Err(ProviderError::Mismatch(format!(
            "{period} 주기에 맞지 않는 kline: {:?}",
            fields[0]
        )));
    }

    Ok(BarRow {
        symbol: symbol.to_string(),
        period,
        trade_date,
        trade_time,
        open: parse_decimal(fields[1], "open")?,
        close: parse_decimal(fields[2], "close")?,
        high: parse_decimal(fields[3], "high")?,
        low: parse_decimal(fields[4], "low")?,
        volume: lots_to_shares(fields[5])?,
        amount: parse_optional_decimal(fields[6], "amount")?,
        turnover_rate: match fields.get(10) {
            Some(raw) => parse_optional_decimal(raw, "turnover")?,
            None => None,
        },
    })
}

/// `시각,가격,거래량(手),체결건수,방향(1 매도/2 매수/4 중립)`
fn parse_details(symbol: &str, date: NaiveDate, lines: &[String]) -> Result<Vec<TickRow>, ProviderError> {
    let mut ticks = Vec::with_capacity(lines.len());
    let mut previous_price = None;

    for line in lines {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 5 {
            return Err(ProviderError::Parse(format!("details 필드 부족: {line:?}")));
        }

        let trade_time = NaiveTime::parse_from_str(fields[0], "%H:%M:%S")
            .map_err(|e| ProviderError::Parse(format!("details 시각 {:?}: {e}", fields[0])))?;
        let price = parse_decimal(fields[1], "price")?;
        let volume = lots_to_shares(fields[2])?;
        let trade_type = match fields[4].trim() {
            "1" => TradeSide::Sell,
            "2" => TradeSide::Buy,
            _ => TradeSide::Neutral,
        };

        ticks.push(TickRow {
            symbol: symbol.to_string(),
            trade_date: date,
            trade_time,
            price,
            volume,
            trade_type,
            price_change: previous_price.map(|prev| price - prev),
            amount: Some(price * rust_decimal::Decimal::from(volume)),
        });
        previous_price = Some(price);
    }

    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_secid() {
        assert_eq!(secid("600000").unwrap(), "1.600000");
        assert_eq!(secid("300750").unwrap(), "0.300750");
        assert!(matches!(secid("830799"), Err(ProviderError::Unsupported(_))));
    }

    #[test]
    fn test_ten_minute_bars_unsupported() {
        assert!(matches!(
            kline_type(Period::Min10),
            Err(ProviderError::Unsupported(_))
        ));
        assert_eq!(kline_type(Period::Daily).unwrap(), "101");
    }

    #[test]
    fn test_parse_daily_kline() {
        let bar = parse_kline(
            "600000",
            Period::Daily,
            "2024-01-02,7.05,7.11,7.15,7.00,5000,3550000.00,2.13,0.85,0.06,0.17",
        )
        .unwrap();

        assert_eq!(bar.trade_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bar.trade_time, None);
        assert_eq!(bar.open, dec!(7.05));
        assert_eq!(bar.close, dec!(7.11));
        assert_eq!(bar.high, dec!(7.15));
        assert_eq!(bar.volume, 500_000);
        assert_eq!(bar.turnover_rate, Some(dec!(0.17)));
    }

    #[test]
    fn test_parse_intraday_kline() {
        let bar = parse_kline(
            "000001",
            Period::Min30,
            "2024-01-02 10:00,9.20,9.25,9.27,9.18,12000,11100000.00",
        )
        .unwrap();
        assert_eq!(bar.trade_time, NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(bar.turnover_rate, None);

        // 일봉 주기에 분봉 형식이 오면 불일치
        let err = parse_kline(
            "000001",
            Period::Daily,
            "2024-01-02 10:00,9.20,9.25,9.27,9.18,12000,11100000.00",
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Mismatch(_)));
    }

    #[test]
    fn test_parse_details_sides_and_changes() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let lines = vec![
            "09:25:00,7.05,12,3,4".to_string(),
            "09:30:03,7.06,5,1,2".to_string(),
            "09:30:06,7.04,8,2,1".to_string(),
        ];
        let ticks = parse_details("600000", date, &lines).unwrap();

        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].trade_type, TradeSide::Neutral);
        assert_eq!(ticks[0].price_change, None);
        assert_eq!(ticks[1].trade_type, TradeSide::Buy);
        assert_eq!(ticks[1].price_change, Some(dec!(0.01)));
        assert_eq!(ticks[2].trade_type, TradeSide::Sell);
        assert_eq!(ticks[2].volume, 800);
        assert_eq!(ticks[2].amount, Some(dec!(5632.00)));
    }
}
