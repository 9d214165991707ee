//! 종목 식별자.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 상장 거래소.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    /// 상하이 (주판, 과창판)
    Sh,
    /// 선전 (주판, 중소판, 창업판)
    Sz,
}

impl Market {
    /// 6자리 종목코드에서 거래소 판별.
    ///
    /// 수집 대상은 `0`, `3`, `6`으로 시작하는 A주 코드뿐이며,
    /// 그 외(B주, 베이징 등)는 `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match code.as_bytes()[0] {
            b'6' => Some(Self::Sh),
            b'0' | b'3' => Some(Self::Sz),
            _ => None,
        }
    }

    /// 소문자 접두어 (`sh`, `sz`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sh => "sh",
            Self::Sz => "sz",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 상장 종목.
///
/// 심볼 목록 동기화 때마다 `(code, market)` 기준으로 통째로 갱신됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// 6자리 종목코드 (예: "600000")
    pub code: String,
    /// 표시 이름
    pub name: String,
    /// 거래소
    pub market: Market,
}

impl Symbol {
    /// 코드에서 거래소를 추론하여 생성. A주 코드가 아니면 `None`.
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Option<Self> {
        let code = code.into();
        let market = Market::from_code(&code)?;
        Some(Self {
            code,
            name: name.into(),
            market,
        })
    }

    /// 거래소 접두어가 붙은 코드 (예: "sh600000").
    pub fn qualified(&self) -> String {
        format!("{}{}", self.market, self.code)
    }
}
