//! 환경변수 기반 설정 모듈.

use std::{path::PathBuf, str::FromStr, time::Duration};

use ashare_core::Period;

use crate::{CollectorError, Result};

/// 시세 제공자 종류 (우선순위 목록의 원소)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// 동방재부 (기본 1순위)
    Eastmoney,
    /// 텐센트 (기본 2순위)
    Tencent,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eastmoney => "eastmoney",
            Self::Tencent => "tencent",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "eastmoney" | "em" => Ok(Self::Eastmoney),
            "tencent" | "qq" => Ok(Self::Tencent),
            other => Err(CollectorError::Config(format!(
                "알 수 없는 제공자: {other}"
            ))),
        }
    }
}

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL (`--dry-run`이면 불필요)
    pub database_url: Option<String>,
    /// 동시 수집 워커 수
    pub concurrency: usize,
    /// 단일 요청 수집 설정
    pub fetch: FetchConfig,
    /// 일괄 저장 설정
    pub persist: PersistConfig,
    /// 제공자 우선순위 (앞쪽이 우선)
    pub providers: Vec<ProviderKind>,
    /// 수집 대상 설정
    pub collect: CollectConfig,
    /// 실행 리포트 저장 디렉터리
    pub report_dir: PathBuf,
}

/// 단일 요청 수집 설정
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// 시도당 타임아웃 (초)
    pub timeout_secs: u64,
    /// 제공자당 최대 시도 횟수
    pub max_retries: u32,
    /// 같은 제공자 재시도 간 대기 (초)
    pub retry_delay_secs: u64,
    /// 종목 목록 조회 타임아웃 (초). 페이지 단위 조회라 단일 요청보다 길게 잡음
    pub symbol_list_timeout_secs: u64,
}

/// 일괄 저장 설정
#[derive(Debug, Clone)]
pub struct PersistConfig {
    /// 테이블별 청크 크기
    pub chunk_size: usize,
    /// 청크당 최대 쓰기 시도 횟수
    pub max_attempts: u32,
    /// 청크 재시도 간 대기 (밀리초)
    pub retry_delay_ms: u64,
}

/// 수집 대상 설정
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// 캔들 주기 목록
    pub periods: Vec<Period>,
    /// 캔들 수집 기간 (오늘 기준 N일 전부터)
    pub lookback_days: i64,
    /// 일괄 실행 시 틱 수집 여부
    pub include_tick: bool,
    /// 일괄 실행 시 캔들 수집 여부
    pub include_bars: bool,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn symbol_list_timeout(&self) -> Duration {
        Duration::from_secs(self.symbol_list_timeout_secs)
    }
}

impl PersistConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// 환경변수 조회 함수
type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

impl CollectorConfig {
    /// 환경변수에서 설정 로드 (`.env` 포함)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// 임의의 키-값 조회 함수에서 설정 로드
    pub fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let providers = env_var_list(lookup, "PROVIDER_PRIORITY", &["eastmoney", "tencent"])
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<ProviderKind>>>()?;
        if providers.is_empty() {
            return Err(CollectorError::Config(
                "PROVIDER_PRIORITY에 제공자가 하나 이상 필요합니다".to_string(),
            ));
        }

        let periods = env_var_list(lookup, "BAR_PERIODS", &["daily", "1hour", "30min"])
            .iter()
            .map(|s| {
                s.parse::<Period>()
                    .map_err(|e| CollectorError::Config(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        let periods = Period::unique(periods);

        let config = Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            concurrency: env_var_parse(lookup, "COLLECT_CONCURRENCY", 10),
            fetch: FetchConfig {
                timeout_secs: env_var_parse(lookup, "FETCH_TIMEOUT_SECS", 10),
                max_retries: env_var_parse(lookup, "FETCH_MAX_RETRIES", 3),
                retry_delay_secs: env_var_parse(lookup, "FETCH_RETRY_DELAY_SECS", 2),
                symbol_list_timeout_secs: env_var_parse(lookup, "SYMBOL_LIST_TIMEOUT_SECS", 60),
            },
            persist: PersistConfig {
                chunk_size: env_var_parse(lookup, "PERSIST_CHUNK_SIZE", 1000),
                max_attempts: env_var_parse(lookup, "PERSIST_MAX_ATTEMPTS", 3),
                retry_delay_ms: env_var_parse(lookup, "PERSIST_RETRY_DELAY_MS", 500),
            },
            providers,
            collect: CollectConfig {
                periods,
                lookback_days: env_var_parse(lookup, "BAR_LOOKBACK_DAYS", 365),
                include_tick: env_var_bool(lookup, "INCLUDE_TICK", true),
                include_bars: env_var_bool(lookup, "INCLUDE_BARS", true),
            },
            report_dir: lookup("REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./batch_logs")),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(CollectorError::Config(
                "COLLECT_CONCURRENCY는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.persist.chunk_size == 0 {
            return Err(CollectorError::Config(
                "PERSIST_CHUNK_SIZE는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(CollectorError::Config(
                "FETCH_TIMEOUT_SECS는 1 이상이어야 합니다".to_string(),
            ));
        }
        Ok(())
    }

    /// 데이터베이스 URL (필수)
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            CollectorError::Config("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: FromStr>(lookup: &Lookup<'_>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(lookup: &Lookup<'_>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| {
            let v = v.trim().to_lowercase();
            v == "true" || v == "1"
        })
        .unwrap_or(default)
}

/// 환경변수에서 쉼표로 구분된 리스트 파싱 (기본값 지원)
fn env_var_list(lookup: &Lookup<'_>, key: &str, default: &[&str]) -> Vec<String> {
    lookup(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<CollectorConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CollectorConfig::from_lookup(&|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.fetch.timeout(), Duration::from_secs(10));
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.persist.chunk_size, 1000);
        assert_eq!(config.persist.max_attempts, 3);
        assert_eq!(config.persist.retry_delay(), Duration::from_millis(500));
        assert_eq!(
            config.providers,
            vec![ProviderKind::Eastmoney, ProviderKind::Tencent]
        );
        assert_eq!(
            config.collect.periods,
            vec![Period::Daily, Period::Hour1, Period::Min30]
        );
        assert!(config.database_url.is_none());
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://u:p@localhost/ashare"),
            ("COLLECT_CONCURRENCY", "4"),
            ("PROVIDER_PRIORITY", "tencent, eastmoney"),
            ("BAR_PERIODS", "week,5min"),
            ("INCLUDE_TICK", "false"),
            ("REPORT_DIR", "/tmp/reports"),
        ])
        .unwrap();

        assert_eq!(config.concurrency, 4);
        assert_eq!(
            config.providers,
            vec![ProviderKind::Tencent, ProviderKind::Eastmoney]
        );
        assert_eq!(config.collect.periods, vec![Period::Week, Period::Min5]);
        assert!(!config.collect.include_tick);
        assert_eq!(config.report_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(
            config.require_database_url().unwrap(),
            "postgres://u:p@localhost/ashare"
        );
    }

    #[test]
    fn test_invalid_number_falls_back_to_default() {
        let config = load(&[("FETCH_TIMEOUT_SECS", "abc")]).unwrap();
        assert_eq!(config.fetch.timeout_secs, 10);
    }

    #[test]
    fn test_duplicate_periods_collapse() {
        let config = load(&[("BAR_PERIODS", "daily, 30min, daily")]).unwrap();
        assert_eq!(config.collect.periods, vec![Period::Daily, Period::Min30]);
    }

    #[test]
    fn test_rejects_unknown_names_and_zero_sizes() {
        assert!(load(&[("PROVIDER_PRIORITY", "sina")]).is_err());
        assert!(load(&[("PROVIDER_PRIORITY", " , ")]).is_err());
        assert!(load(&[("BAR_PERIODS", "2hour")]).is_err());
        assert!(load(&[("COLLECT_CONCURRENCY", "0")]).is_err());
        assert!(load(&[("PERSIST_CHUNK_SIZE", "0")]).is_err());
    }
}
