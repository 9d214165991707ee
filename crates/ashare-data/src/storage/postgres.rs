//! PostgreSQL 저장소.
//!
//! 틱은 거래일별, 캔들은 주기별 테이블에 저장하며 테이블은 처음 쓸 때 생성합니다.
//! 일괄 저장은 UNNEST 배열 바인딩 + `ON CONFLICT DO UPDATE` 한 문장으로 수행합니다.

use std::{collections::HashSet, sync::Mutex};

use async_trait::async_trait;
use ashare_core::{BarRow, Market, Period, Row, Symbol, TableTarget, TickRow, TradeSide};
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPool, FromRow};
use tracing::{debug, instrument};

use super::{RowStore, UpsertCount};
use crate::{Result, StoreError};

const SYMBOL_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS stock_info (
    id BIGSERIAL PRIMARY KEY,
    stock_code VARCHAR(10) NOT NULL,
    stock_name VARCHAR(64) NOT NULL,
    market VARCHAR(4) NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (stock_code, market)
)
"#;

/// 틱 테이블 레코드.
#[derive(Debug, Clone, FromRow)]
struct TickRecord {
    stock_code: String,
    trade_date: NaiveDate,
    trade_time: NaiveTime,
    price: Decimal,
    volume: i64,
    trade_type: String,
    price_change: Option<Decimal>,
    amount: Option<Decimal>,
}

impl TickRecord {
    fn into_row(self) -> TickRow {
        TickRow {
            symbol: self.stock_code,
            trade_date: self.trade_date,
            trade_time: self.trade_time,
            price: self.price,
            volume: self.volume,
            trade_type: TradeSide::parse_lossy(&self.trade_type),
            price_change: self.price_change,
            amount: self.amount,
        }
    }
}

/// 캔들 테이블 레코드.
#[derive(Debug, Clone, FromRow)]
struct BarRecord {
    stock_code: String,
    trade_date: NaiveDate,
    bar_time: NaiveTime,
    open_price: Decimal,
    high_price: Decimal,
    low_price: Decimal,
    close_price: Decimal,
    volume: i64,
    amount: Option<Decimal>,
    turnover_rate: Option<Decimal>,
}

impl BarRecord {
    fn into_row(self, period: Period) -> BarRow {
        BarRow {
            symbol: self.stock_code,
            period,
            trade_date: self.trade_date,
            trade_time: period.is_intraday().then_some(self.bar_time),
            open: self.open_price,
            high: self.high_price,
            low: self.low_price,
            close: self.close_price,
            volume: self.volume,
            amount: self.amount,
            turnover_rate: self.turnover_rate,
        }
    }
}

/// PostgreSQL 저장소.
pub struct PgRowStore {
    pool: PgPool,
    /// 이 프로세스에서 이미 생성 확인한 테이블
    created: Mutex<HashSet<String>>,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            created: Mutex::new(HashSet::new()),
        }
    }

    /// 종목 테이블 생성.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SYMBOL_TABLE_DDL).execute(&self.pool).await?;
        Ok(())
    }

    fn is_created(&self, name: &str) -> bool {
        self.created
            .lock()
            .map(|set| set.contains(name))
            .unwrap_or(false)
    }

    fn mark_created(&self, name: String) {
        if let Ok(mut set) = self.created.lock() {
            set.insert(name);
        }
    }

    async fn ensure_table(&self, target: &TableTarget) -> Result<String> {
        let name = target.table_name();
        if self.is_created(&name) {
            return Ok(name);
        }

        let ddl = match target {
            TableTarget::Ticks(_) => format!(
                r#"
                CREATE TABLE IF NOT EXISTS {name} (
                    id BIGSERIAL PRIMARY KEY,
                    stock_code VARCHAR(10) NOT NULL,
                    trade_date DATE NOT NULL,
                    trade_time TIME NOT NULL,
                    price NUMERIC(12,3) NOT NULL,
                    volume BIGINT NOT NULL,
                    trade_type VARCHAR(10) NOT NULL,
                    price_change NUMERIC(12,3),
                    amount NUMERIC(20,2),
                    fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    UNIQUE ({key})
                )
                "#,
                key = target.natural_key_columns().join(", ")
            ),
            TableTarget::Bars(_) => format!(
                r#"
                CREATE TABLE IF NOT EXISTS {name} (
                    id BIGSERIAL PRIMARY KEY,
                    stock_code VARCHAR(10) NOT NULL,
                    trade_date DATE NOT NULL,
                    bar_time TIME NOT NULL DEFAULT '00:00:00',
                    open_price NUMERIC(12,3) NOT NULL,
                    high_price NUMERIC(12,3) NOT NULL,
                    low_price NUMERIC(12,3) NOT NULL,
                    close_price NUMERIC(12,3) NOT NULL,
                    volume BIGINT NOT NULL,
                    amount NUMERIC(20,2),
                    turnover_rate NUMERIC(8,4),
                    fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    UNIQUE ({key})
                )
                "#,
                key = target.natural_key_columns().join(", ")
            ),
        };

        sqlx::query(&ddl).execute(&self.pool).await?;
        debug!(table = %name, "테이블 생성 확인");
        self.mark_created(name.clone());
        Ok(name)
    }

    /// 테이블 존재 여부 (조회 전용 경로에서 사용).
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn upsert_ticks(&self, table: &str, target: &TableTarget, ticks: &[&TickRow]) -> Result<Vec<bool>> {
        let codes: Vec<&str> = ticks.iter().map(|t| t.symbol.as_str()).collect();
        let dates: Vec<NaiveDate> = ticks.iter().map(|t| t.trade_date).collect();
        let times: Vec<NaiveTime> = ticks.iter().map(|t| t.trade_time).collect();
        let prices: Vec<Decimal> = ticks.iter().map(|t| t.price).collect();
        let volumes: Vec<i64> = ticks.iter().map(|t| t.volume).collect();
        let sides: Vec<&str> = ticks.iter().map(|t| t.trade_type.as_str()).collect();
        let changes: Vec<Option<Decimal>> = ticks.iter().map(|t| t.price_change).collect();
        let amounts: Vec<Option<Decimal>> = ticks.iter().map(|t| t.amount).collect();

        let sql = format!(
            r#"
            INSERT INTO {table}
                (stock_code, trade_date, trade_time, price, volume, trade_type, price_change, amount, fetched_at)
            SELECT u.*, NOW() FROM UNNEST(
                $1::text[], $2::date[], $3::time[], $4::numeric[],
                $5::int8[], $6::text[], $7::numeric[], $8::numeric[]
            ) AS u
            ON CONFLICT ({key}) DO UPDATE SET
                price_change = EXCLUDED.price_change,
                amount = EXCLUDED.amount,
                fetched_at = NOW()
            RETURNING (xmax = 0) AS inserted
            "#,
            key = target.natural_key_columns().join(", ")
        );

        let flags = sqlx::query_scalar::<_, bool>(&sql)
            .bind(&codes)
            .bind(&dates)
            .bind(&times)
            .bind(&prices)
            .bind(&volumes)
            .bind(&sides)
            .bind(&changes)
            .bind(&amounts)
            .fetch_all(&self.pool)
            .await?;
        Ok(flags)
    }

    async fn upsert_bars(&self, table: &str, target: &TableTarget, bars: &[&BarRow]) -> Result<Vec<bool>> {
        let codes: Vec<&str> = bars.iter().map(|b| b.symbol.as_str()).collect();
        let dates: Vec<NaiveDate> = bars.iter().map(|b| b.trade_date).collect();
        let times: Vec<NaiveTime> = bars.iter().map(|b| b.key_time()).collect();
        let opens: Vec<Decimal> = bars.iter().map(|b| b.open).collect();
        let highs: Vec<Decimal> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<Decimal> = bars.iter().map(|b| b.low).collect();
        let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<i64> = bars.iter().map(|b| b.volume).collect();
        let amounts: Vec<Option<Decimal>> = bars.iter().map(|b| b.amount).collect();
        let turnovers: Vec<Option<Decimal>> = bars.iter().map(|b| b.turnover_rate).collect();

        // 마지막 쓰기 우선: 키가 아닌 모든 컬럼을 무조건 덮어씀
        let sql = format!(
            r#"
            INSERT INTO {table}
                (stock_code, trade_date, bar_time, open_price, high_price, low_price, close_price,
                 volume, amount, turnover_rate, fetched_at)
            SELECT u.*, NOW() FROM UNNEST(
                $1::text[], $2::date[], $3::time[],
                $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[],
                $8::int8[], $9::numeric[], $10::numeric[]
            ) AS u
            ON CONFLICT ({key}) DO UPDATE SET
                open_price = EXCLUDED.open_price,
                high_price = EXCLUDED.high_price,
                low_price = EXCLUDED.low_price,
                close_price = EXCLUDED.close_price,
                volume = EXCLUDED.volume,
                amount = EXCLUDED.amount,
                turnover_rate = EXCLUDED.turnover_rate,
                fetched_at = NOW()
            RETURNING (xmax = 0) AS inserted
            "#,
            key = target.natural_key_columns().join(", ")
        );

        let flags = sqlx::query_scalar::<_, bool>(&sql)
            .bind(&codes)
            .bind(&dates)
            .bind(&times)
            .bind(&opens)
            .bind(&highs)
            .bind(&lows)
            .bind(&closes)
            .bind(&volumes)
            .bind(&amounts)
            .bind(&turnovers)
            .fetch_all(&self.pool)
            .await?;
        Ok(flags)
    }
}

fn count_flags(flags: &[bool]) -> UpsertCount {
    let inserted = flags.iter().filter(|inserted| **inserted).count();
    UpsertCount {
        inserted,
        updated: flags.len() - inserted,
    }
}

fn parse_market(s: &str) -> Option<Market> {
    match s {
        "sh" => Some(Market::Sh),
        "sz" => Some(Market::Sz),
        _ => None,
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    #[instrument(skip(self, rows), fields(table = %target, count = rows.len()))]
    async fn upsert(&self, target: &TableTarget, rows: &[Row]) -> Result<UpsertCount> {
        if rows.is_empty() {
            return Ok(UpsertCount::default());
        }
        if let Some(row) = rows.iter().find(|r| r.table() != *target) {
            return Err(StoreError::InvalidTable(format!(
                "{} 행은 {}에 저장할 수 없음",
                row.table(),
                target
            )));
        }

        let table = self.ensure_table(target).await?;
        let flags = match target {
            TableTarget::Ticks(_) => {
                let ticks: Vec<&TickRow> = rows
                    .iter()
                    .filter_map(|r| match r {
                        Row::Tick(t) => Some(t),
                        Row::Bar(_) => None,
                    })
                    .collect();
                self.upsert_ticks(&table, target, &ticks).await?
            }
            TableTarget::Bars(_) => {
                let bars: Vec<&BarRow> = rows
                    .iter()
                    .filter_map(|r| match r {
                        Row::Bar(b) => Some(b),
                        Row::Tick(_) => None,
                    })
                    .collect();
                self.upsert_bars(&table, target, &bars).await?
            }
        };

        let count = count_flags(&flags);
        debug!(
            inserted = count.inserted,
            updated = count.updated,
            "청크 UPSERT 완료"
        );
        Ok(count)
    }

    #[instrument(skip(self, symbols), fields(count = symbols.len()))]
    async fn upsert_symbols(&self, symbols: &[Symbol]) -> Result<UpsertCount> {
        if symbols.is_empty() {
            return Ok(UpsertCount::default());
        }

        let mut query_builder =
            sqlx::QueryBuilder::new("INSERT INTO stock_info (stock_code, stock_name, market, updated_at) ");
        query_builder.push_values(symbols, |mut b, sym| {
            b.push_bind(&sym.code)
                .push_bind(&sym.name)
                .push_bind(sym.market.as_str())
                .push("NOW()");
        });
        query_builder.push(
            " ON CONFLICT (stock_code, market) DO UPDATE SET \
             stock_name = EXCLUDED.stock_name, \
             updated_at = NOW() \
             RETURNING (xmax = 0) AS inserted",
        );

        let flags: Vec<bool> = query_builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;
        Ok(count_flags(&flags))
    }

    async fn load_symbols(&self) -> Result<Vec<Symbol>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT stock_code, stock_name, market FROM stock_info ORDER BY market, stock_code",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(code, name, market)| {
                parse_market(&market).map(|market| Symbol { code, name, market })
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn query_ticks(&self, symbol: &str, date: NaiveDate) -> Result<Vec<TickRow>> {
        let table = TableTarget::Ticks(date).table_name();
        if !self.table_exists(&table).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT stock_code, trade_date, trade_time, price, volume, trade_type, price_change, amount \
             FROM {table} WHERE stock_code = $1 ORDER BY trade_time, id"
        );
        let records: Vec<TickRecord> = sqlx::query_as(&sql)
            .bind(symbol)
            .fetch_all(&self.pool)
            .await?;
        Ok(records.into_iter().map(TickRecord::into_row).collect())
    }

    #[instrument(skip(self))]
    async fn query_bars(
        &self,
        symbol: &str,
        period: Period,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BarRow>> {
        let table = TableTarget::Bars(period).table_name();
        if !self.table_exists(&table).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT stock_code, trade_date, bar_time, open_price, high_price, low_price, close_price, \
             volume, amount, turnover_rate \
             FROM {table} WHERE stock_code = $1 AND trade_date BETWEEN $2 AND $3 \
             ORDER BY trade_date, bar_time"
        );
        let records: Vec<BarRecord> = sqlx::query_as(&sql)
            .bind(symbol)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(records.into_iter().map(|r| r.into_row(period)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_flags() {
        assert_eq!(
            count_flags(&[true, false, true]),
            UpsertCount { inserted: 2, updated: 1 }
        );
        assert_eq!(count_flags(&[]), UpsertCount::default());
    }

    #[test]
    fn test_parse_market() {
        assert_eq!(parse_market("sh"), Some(Market::Sh));
        assert_eq!(parse_market("sz"), Some(Market::Sz));
        assert_eq!(parse_market("bj"), None);
    }
}
