//! 거래소 계좌 레코드.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// 시장 환경 (실계좌 / 샌드박스).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketEnvironment {
    /// 실계좌
    #[default]
    Live,
    /// 모의 거래 환경
    #[serde(alias = "demo", alias = "testnet")]
    Sandbox,
}

impl MarketEnvironment {
    /// 샌드박스 여부.
    pub fn is_sandbox(&self) -> bool {
        matches!(self, MarketEnvironment::Sandbox)
    }
}

impl fmt::Display for MarketEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketEnvironment::Live => write!(f, "live"),
            MarketEnvironment::Sandbox => write!(f, "sandbox"),
        }
    }
}

fn default_active() -> bool {
    true
}

/// 하나의 거래소 자격증명 세트.
///
/// 코어 입장에서는 작업 중 읽기 전용입니다.
///
/// # 보안
/// - `Debug` 구현은 `api_key`를 마스킹하고 `api_secret`을 노출하지 않습니다.
#[derive(Clone, Deserialize)]
pub struct Account {
    /// 계좌 식별자
    pub id: String,
    /// 표시 이름 (소유자 등)
    #[serde(default)]
    pub label: String,
    /// API 키
    pub api_key: String,
    /// API 시크릿
    pub api_secret: String,
    /// 시장 환경
    #[serde(default)]
    pub environment: MarketEnvironment,
    /// 주문 변경 작업 대상 여부
    #[serde(default = "default_active")]
    pub active: bool,
    /// 심볼별 레버리지 오버라이드
    #[serde(default)]
    pub leverage: HashMap<String, u32>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("api_key", &mask_key(&self.api_key))
            .field("api_secret", &"***REDACTED***")
            .field("environment", &self.environment)
            .field("active", &self.active)
            .field("leverage", &self.leverage)
            .finish()
    }
}

impl Account {
    /// 새 계좌 생성 (실계좌, 활성, 오버라이드 없음).
    pub fn new(
        id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            environment: MarketEnvironment::Live,
            active: true,
            leverage: HashMap::new(),
        }
    }

    /// 표시 이름 설정.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// 시장 환경 설정.
    pub fn with_environment(mut self, environment: MarketEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// 활성 여부 설정.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// 심볼 레버리지 오버라이드 추가.
    pub fn with_leverage(mut self, symbol: impl Into<String>, leverage: u32) -> Self {
        self.leverage.insert(symbol.into(), leverage);
        self
    }

    /// 심볼에 저장된 레버리지 오버라이드 조회.
    pub fn leverage_for(&self, symbol: &str) -> Option<u32> {
        self.leverage.get(symbol).copied()
    }
}

/// 로그/디버그 출력용 API 키 마스킹.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "***REDACTED***".to_string()
    }
}
