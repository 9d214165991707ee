//! 종목 목록 동기화.
//!
//! 종목 목록 제공자를 우선순위 순서로 시도하여 첫 번째로 성공한 목록을
//! `(code, market)` 기준으로 저장합니다. 저장 실패는 기록만 하고, 조회한 목록은
//! 그대로 이후 단계의 스냅샷으로 사용합니다.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use ashare_core::{Market, Symbol, SymbolDirectory};
use ashare_data::{RowStore, UpsertCount};
use serde::Serialize;
use tracing::{error, info, warn};

/// 종목 동기화 결과 (리포트 항목).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolRefreshReport {
    /// 목록을 제공한 소스
    pub source: Option<String>,
    /// 조회한 종목 수 (중복 제거 후)
    pub fetched: usize,
    /// 저장 결과
    pub upserted: UpsertCount,
    /// 소스별 실패 메시지
    pub source_errors: Vec<String>,
    /// 저장 실패 메시지
    pub store_error: Option<String>,
}

/// 종목 동기화 결과.
#[derive(Debug, Clone, Default)]
pub struct SymbolSync {
    /// 코드 순으로 정렬된 종목 목록 (모든 소스 실패 시 빈 목록)
    pub symbols: Vec<Symbol>,
    pub report: SymbolRefreshReport,
}

/// 종목 목록 조회 후 저장.
pub async fn sync_symbols(
    directories: &[Arc<dyn SymbolDirectory>],
    store: &dyn RowStore,
    timeout: Duration,
    chunk_size: usize,
) -> SymbolSync {
    let mut report = SymbolRefreshReport::default();

    for directory in directories {
        let listed = match tokio::time::timeout(timeout, directory.list_symbols()).await {
            Ok(Ok(list)) if !list.is_empty() => list,
            Ok(Ok(_)) => {
                warn!(source = directory.name(), "빈 종목 목록");
                report
                    .source_errors
                    .push(format!("{}: 빈 종목 목록", directory.name()));
                continue;
            }
            Ok(Err(e)) => {
                warn!(source = directory.name(), error = %e, "종목 목록 조회 실패");
                report.source_errors.push(format!("{}: {}", directory.name(), e));
                continue;
            }
            Err(_) => {
                warn!(source = directory.name(), timeout_secs = timeout.as_secs(), "종목 목록 조회 타임아웃");
                report
                    .source_errors
                    .push(format!("{}: 타임아웃", directory.name()));
                continue;
            }
        };

        let symbols = dedupe(listed);
        report.source = Some(directory.name().to_string());
        report.fetched = symbols.len();

        for chunk in symbols.chunks(chunk_size.max(1)) {
            match store.upsert_symbols(chunk).await {
                Ok(count) => report.upserted += count,
                Err(e) => {
                    error!(error = %e, "종목 저장 실패, 조회한 목록으로 계속 진행");
                    report.store_error = Some(e.to_string());
                    break;
                }
            }
        }

        info!(
            source = directory.name(),
            fetched = report.fetched,
            inserted = report.upserted.inserted,
            updated = report.upserted.updated,
            "종목 동기화 완료"
        );
        return SymbolSync { symbols, report };
    }

    error!(errors = ?report.source_errors, "모든 종목 목록 소스 실패");
    SymbolSync {
        symbols: Vec::new(),
        report,
    }
}

/// `(code, market)` 기준 중복 제거 (나중 이름 우선), 시장/코드 순 정렬.
fn dedupe(symbols: Vec<Symbol>) -> Vec<Symbol> {
    let mut unique: BTreeMap<(Market, String), Symbol> = BTreeMap::new();
    for symbol in symbols {
        unique.insert((symbol.market, symbol.code.clone()), symbol);
    }
    unique.into_values().collect()
}

/// `--symbols` 필터 적용. 목록에 없는 코드는 경고 후 무시합니다.
pub fn filter_symbols(symbols: Vec<Symbol>, only: Option<&[String]>) -> Vec<Symbol> {
    let Some(only) = only else {
        return symbols;
    };

    let filtered: Vec<Symbol> = symbols
        .into_iter()
        .filter(|s| only.iter().any(|code| code == &s.code))
        .collect();

    for code in only {
        if !filtered.iter().any(|s| &s.code == code) {
            warn!(code = %code, "종목 목록에 없는 코드");
        }
    }
    filtered
}
