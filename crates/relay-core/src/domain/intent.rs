//! 거래 의도와 액션별 요청 타입.
//!
//! 라우터가 디코딩한 요청이 그대로 디스패처로 전달됩니다.
//! 한 번의 디스패치 동안 불변이며 모든 계좌 작업이 읽기 전용으로 공유합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{RelayError, RelayResult};

/// 포지션 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 롱 (매수)
    #[serde(alias = "buy", alias = "Buy", alias = "BUY")]
    Long,
    /// 숏 (매도)
    #[serde(alias = "sell", alias = "Sell", alias = "SELL")]
    Short,
}

impl Side {
    /// 거래소 주문 방향 문자열 ("Buy" / "Sell").
    pub fn order_side(&self) -> &'static str {
        match self {
            Side::Long => "Buy",
            Side::Short => "Sell",
        }
    }

    /// 거래소 주문 방향 문자열에서 파싱. 빈 문자열은 포지션 없음.
    pub fn from_order_side(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Long),
            "sell" => Some(Side::Short),
            _ => None,
        }
    }

    /// 반대 방향.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// 거래소 시장 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// USDT 무기한 선물
    #[default]
    Linear,
    /// 코인 마진 무기한 선물
    Inverse,
    /// 현물
    Spot,
    /// 옵션
    Option,
}

impl Category {
    /// 거래소 API 값.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Linear => "linear",
            Category::Inverse => "inverse",
            Category::Spot => "spot",
            Category::Option => "option",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 심볼 정규화 (앞뒤 공백 제거, 대문자).
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

fn deserialize_symbol<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|s| normalize_symbol(&s))
}

/// 빈 문자열은 필터 없음으로 취급합니다.
fn deserialize_symbol_filter<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let symbol = Option::<String>::deserialize(deserializer)?;
    Ok(symbol.map(|s| normalize_symbol(&s)).filter(|s| !s.is_empty()))
}

/// 심볼은 대문자 영문과 숫자로만 구성됩니다 (서명 쿼리에 그대로 들어감).
fn require_symbol(symbol: &str) -> RelayResult<()> {
    if symbol.is_empty() {
        return Err(RelayError::InvalidInput("symbol이 비어 있습니다".to_string()));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(RelayError::InvalidInput(format!(
            "symbol은 대문자 영문과 숫자만 허용됩니다: {:?}",
            symbol
        )));
    }
    Ok(())
}

/// 모든 계좌로 팬아웃되는 거래 의도.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingIntent {
    /// 심볼 (예: "BTCUSDT")
    #[serde(deserialize_with = "deserialize_symbol")]
    pub symbol: String,
    /// 시장 구분
    #[serde(default)]
    pub category: Category,
    /// 방향
    pub side: Side,
    /// 잔고 대비 사용 비율 (%)
    #[serde(alias = "percent")]
    pub risk_percent: Decimal,
    /// 목표 수익 비율 (%)
    #[serde(alias = "profit")]
    pub profit_percent: Decimal,
    /// 최대 손실 비율 (%)
    #[serde(alias = "max_loss")]
    pub loss_percent: Decimal,
    /// 레버리지 (계좌 오버라이드가 없을 때만 사용)
    #[serde(default)]
    pub leverage: Option<u32>,
}

impl TradingIntent {
    /// 새 거래 의도 생성 (linear, 레버리지 미지정).
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        risk_percent: Decimal,
        profit_percent: Decimal,
        loss_percent: Decimal,
    ) -> Self {
        Self {
            symbol: normalize_symbol(&Into::<String>::into(symbol)),
            category: Category::Linear,
            side,
            risk_percent,
            profit_percent,
            loss_percent,
            leverage: None,
        }
    }

    /// 시장 구분 설정.
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// 레버리지 설정.
    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = Some(leverage);
        self
    }

    /// 요청 단계 검증.
    ///
    /// 라우터가 디스패치 전에 호출합니다. 계좌 데이터가 필요한 검증(가격, 잔고)은
    /// 포지션 사이저가 계좌별로 수행합니다.
    pub fn validate(&self) -> RelayResult<()> {
        require_symbol(&self.symbol)?;

        if self.risk_percent <= Decimal::ZERO || self.risk_percent > Decimal::ONE_HUNDRED {
            return Err(RelayError::InvalidInput(format!(
                "risk_percent는 0 초과 100 이하여야 합니다: {}",
                self.risk_percent
            )));
        }
        if self.profit_percent < Decimal::ZERO || self.loss_percent < Decimal::ZERO {
            return Err(RelayError::InvalidInput(
                "profit_percent/loss_percent는 음수일 수 없습니다".to_string(),
            ));
        }
        if self.leverage == Some(0) {
            return Err(RelayError::InvalidInput("leverage는 1 이상이어야 합니다".to_string()));
        }
        Ok(())
    }
}

/// 포지션 청산 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseRequest {
    #[serde(deserialize_with = "deserialize_symbol")]
    pub symbol: String,
    #[serde(default)]
    pub category: Category,
}

impl CloseRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: normalize_symbol(&Into::<String>::into(symbol)),
            category: Category::Linear,
        }
    }

    pub fn validate(&self) -> RelayResult<()> {
        require_symbol(&self.symbol)
    }
}

/// 레버리지 변경 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageRequest {
    #[serde(deserialize_with = "deserialize_symbol")]
    pub symbol: String,
    #[serde(default)]
    pub category: Category,
    pub leverage: u32,
}

impl LeverageRequest {
    pub fn new(symbol: impl Into<String>, leverage: u32) -> Self {
        Self {
            symbol: normalize_symbol(&Into::<String>::into(symbol)),
            category: Category::Linear,
            leverage,
        }
    }

    pub fn validate(&self) -> RelayResult<()> {
        require_symbol(&self.symbol)?;
        if self.leverage == 0 {
            return Err(RelayError::InvalidInput("leverage는 1 이상이어야 합니다".to_string()));
        }
        Ok(())
    }
}

/// 오픈 포지션 TP/SL 변경 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingStopRequest {
    #[serde(deserialize_with = "deserialize_symbol")]
    pub symbol: String,
    #[serde(default)]
    pub category: Category,
    /// 새 익절 가격
    #[serde(default, alias = "tp")]
    pub take_profit: Option<Decimal>,
    /// 새 손절 가격
    #[serde(default, alias = "sl")]
    pub stop_loss: Option<Decimal>,
}

impl TradingStopRequest {
    pub fn new(
        symbol: impl Into<String>,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Self {
        Self {
            symbol: normalize_symbol(&Into::<String>::into(symbol)),
            category: Category::Linear,
            take_profit,
            stop_loss,
        }
    }

    pub fn validate(&self) -> RelayResult<()> {
        require_symbol(&self.symbol)?;
        if self.take_profit.is_none() && self.stop_loss.is_none() {
            return Err(RelayError::InvalidInput(
                "take_profit 또는 stop_loss 중 하나는 필요합니다".to_string(),
            ));
        }
        let non_positive = |v: &Option<Decimal>| v.is_some_and(|p| p <= Decimal::ZERO);
        if non_positive(&self.take_profit) || non_positive(&self.stop_loss) {
            return Err(RelayError::InvalidInput("TP/SL 가격은 양수여야 합니다".to_string()));
        }
        Ok(())
    }
}

/// 포지션 조회 필터.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionQuery {
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default, deserialize_with = "deserialize_symbol_filter")]
    pub symbol: Option<String>,
}

impl PositionQuery {
    pub fn validate(&self) -> RelayResult<()> {
        match &self.symbol {
            Some(symbol) => require_symbol(symbol),
            None => Ok(()),
        }
    }
}

/// 포지션 모드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    /// 심볼당 한 방향만 허용
    OneWay,
    /// 같은 심볼에 롱/숏 동시 보유 허용
    Hedge,
}

impl PositionMode {
    /// 거래소 모드 코드 (0 = one-way, 3 = hedge).
    pub fn code(&self) -> u8 {
        match self {
            PositionMode::OneWay => 0,
            PositionMode::Hedge => 3,
        }
    }
}

/// 포지션 모드 변경 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionModeRequest {
    #[serde(default)]
    pub category: Category,
    pub mode: PositionMode,
}

impl PositionModeRequest {
    pub fn new(mode: PositionMode) -> Self {
        Self {
            category: Category::Linear,
            mode,
        }
    }

    /// 릴레이는 원웨이 모드(positionIdx 0)로만 주문하므로 헤지 모드 전환은 거부합니다.
    pub fn validate(&self) -> RelayResult<()> {
        if self.mode == PositionMode::Hedge {
            return Err(RelayError::InvalidInput(
                "헤지 모드는 지원하지 않습니다 (one_way만 허용)".to_string(),
            ));
        }
        Ok(())
    }
}
