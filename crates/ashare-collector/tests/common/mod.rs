//! 파이프라인 테스트용 모의 제공자.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use ashare_core::{
    BarRow, DataKind, DateTarget, FetchRequest, Period, ProviderClient, ProviderError,
    ProviderReply, Row, Symbol, SymbolDirectory, TickRow, TradeSide,
};
use chrono::{Days, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// 모의 제공자의 응답 1회.
#[derive(Debug, Clone)]
pub enum Step {
    /// 요청에 맞는 행 n개
    Rows(usize),
    NoData,
    /// `Rows(vec![])`
    EmptyRows,
    Fail(ProviderError),
    /// 응답하지 않음 (타임아웃 유발)
    Hang,
    Panic,
    /// 다른 종목의 행
    WrongSymbol,
}

type Script = dyn Fn(&FetchRequest, u32) -> Step + Send + Sync;

/// 호출 횟수와 동시 실행 수를 기록하는 모의 제공자.
pub struct MockProvider {
    name: String,
    script: Box<Script>,
    latency: Duration,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    /// 요청과 호출 번호(1부터)로 응답을 정하는 제공자.
    pub fn with(name: &str, script: impl Fn(&FetchRequest, u32) -> Step + Send + Sync + 'static) -> Self {
        Self {
            name: name.to_string(),
            script: Box::new(script),
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// 순서대로 응답하고, 목록이 끝나면 마지막 응답을 반복하는 제공자.
    pub fn scripted(name: &str, steps: Vec<Step>) -> Self {
        Self::with(name, move |_, call| {
            let index = (call as usize - 1).min(steps.len() - 1);
            steps[index].clone()
        })
    }

    /// 항상 같은 응답을 하는 제공자.
    pub fn always(name: &str, step: Step) -> Self {
        Self::scripted(name, vec![step])
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// 동시 실행 수 기록용 가드.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<ProviderReply, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match (self.script)(request, call) {
            Step::Rows(n) => Ok(ProviderReply::Rows(rows_for(request, &request.symbol, n))),
            Step::NoData => Ok(ProviderReply::NoData),
            Step::EmptyRows => Ok(ProviderReply::Rows(Vec::new())),
            Step::Fail(e) => Err(e),
            Step::Hang => std::future::pending().await,
            Step::Panic => panic!("모의 제공자 패닉: {}", request),
            Step::WrongSymbol => Ok(ProviderReply::Rows(rows_for(request, "999999", 1))),
        }
    }
}

/// 요청에 맞는 행 n개. 틱은 초 단위, 분봉은 분 단위, 일봉 이상은 일 단위로 키가 달라집니다.
pub fn rows_for(request: &FetchRequest, symbol: &str, n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| match (request.kind, request.target) {
            (DataKind::Tick, target) => Row::Tick(tick(symbol, target.start(), i as u32, dec!(10.00))),
            (DataKind::Bar(period), target) if period.is_intraday() => {
                Row::Bar(bar(symbol, period, target.start(), Some(minute(i as u32)), dec!(10.00)))
            }
            (DataKind::Bar(period), DateTarget::Day(day)) => {
                Row::Bar(bar(symbol, period, day, None, dec!(10.00)))
            }
            (DataKind::Bar(period), DateTarget::Range { start, .. }) => {
                let day = start.checked_add_days(Days::new(i as u64)).unwrap_or(start);
                Row::Bar(bar(symbol, period, day, None, dec!(10.00)))
            }
        })
        .collect()
}

pub fn tick(symbol: &str, date: NaiveDate, second: u32, price: Decimal) -> TickRow {
    let base = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    TickRow {
        symbol: symbol.to_string(),
        trade_date: date,
        trade_time: base + chrono::Duration::seconds(second as i64),
        price,
        volume: 100,
        trade_type: TradeSide::Buy,
        price_change: None,
        amount: Some(price * dec!(100)),
    }
}

pub fn bar(symbol: &str, period: Period, date: NaiveDate, time: Option<NaiveTime>, close: Decimal) -> BarRow {
    BarRow {
        symbol: symbol.to_string(),
        period,
        trade_date: date,
        trade_time: time,
        open: dec!(10.00),
        high: close.max(dec!(10.00)),
        low: close.min(dec!(10.00)),
        close,
        volume: 1000,
        amount: None,
        turnover_rate: None,
    }
}

fn minute(i: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(9, 31, 0).unwrap() + chrono::Duration::minutes(i as i64)
}

/// 고정 종목 목록 또는 에러를 돌려주는 모의 종목 목록 제공자.
pub struct MockDirectory {
    name: String,
    result: Result<Vec<Symbol>, ProviderError>,
    calls: AtomicU32,
}

impl MockDirectory {
    pub fn listing(symbols: Vec<Symbol>) -> Self {
        Self {
            name: "mock-directory".to_string(),
            result: Ok(symbols),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            name: "mock-directory".to_string(),
            result: Err(error),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SymbolDirectory for MockDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_symbols(&self) -> Result<Vec<Symbol>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// 상하이 종목 `600000`부터 n개.
pub fn sh_symbols(n: usize) -> Vec<Symbol> {
    (0..n)
        .filter_map(|i| Symbol::new(format!("{:06}", 600000 + i), format!("종목{i}")))
        .collect()
}

/// 코드 `600000 + i`의 i.
pub fn symbol_index(request: &FetchRequest) -> usize {
    request.symbol.parse::<usize>().map_or(0, |code| code.saturating_sub(600000))
}

pub fn as_provider(provider: &Arc<MockProvider>) -> Arc<dyn ProviderClient> {
    Arc::clone(provider) as Arc<dyn ProviderClient>
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
