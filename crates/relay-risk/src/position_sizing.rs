//! 포지션 크기 계산.
//!
//! 제공 기능:
//! - 잔고 × 레버리지 × 사용 비율 기반 주문 수량 계산
//! - 방향별 TP/SL 가격 계산 및 호가 자릿수 라운딩
//! - 명목 가치 계산
//!
//! I/O가 없는 순수 계산이므로 같은 입력에 항상 같은 결과를 돌려줍니다.

use relay_core::{InstrumentConstraints, RelayError, RelayResult, Side, SizingResult, TradingIntent};
use rust_decimal::Decimal;
use tracing::debug;

/// 명목 가치 소수 자릿수.
const NOTIONAL_PRECISION: u32 = 2;

/// 계좌 하나에 대한 사이징 입력.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingInput {
    /// USDT 잔고
    pub balance: Decimal,
    /// 최종 체결가
    pub price: Decimal,
    /// 잔고 대비 사용 비율 (%)
    pub risk_percent: Decimal,
    pub leverage: u32,
    /// 목표 수익 비율 (%)
    pub profit_percent: Decimal,
    /// 최대 손실 비율 (%)
    pub loss_percent: Decimal,
    pub side: Side,
    pub constraints: InstrumentConstraints,
}

impl SizingInput {
    /// 거래 의도와 계좌별 조회 값으로 입력 생성.
    pub fn from_intent(
        intent: &TradingIntent,
        balance: Decimal,
        price: Decimal,
        leverage: u32,
        constraints: InstrumentConstraints,
    ) -> Self {
        Self {
            balance,
            price,
            risk_percent: intent.risk_percent,
            leverage,
            profit_percent: intent.profit_percent,
            loss_percent: intent.loss_percent,
            side: intent.side,
            constraints,
        }
    }
}

/// 포지션 사이저.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionSizer;

impl PositionSizer {
    pub fn new() -> Self {
        Self
    }

    /// 주문 수량, TP/SL, 명목 가치를 계산합니다.
    ///
    /// 라운딩 후 수량이 0이어도 거부하지 않습니다. 최소 주문 크기는
    /// 거래소가 판단합니다.
    ///
    /// # Errors
    /// 가격/잔고가 0 이하이거나 레버리지/비율이 유효하지 않으면 `InvalidInput`.
    pub fn size(&self, input: &SizingInput) -> RelayResult<SizingResult> {
        Self::validate(input)?;

        let hundred = Decimal::ONE_HUNDRED;
        let leverage = Decimal::from(input.leverage);
        let raw_qty = input
            .balance
            .checked_mul(leverage)
            .and_then(|v| v.checked_mul(input.risk_percent))
            .and_then(|v| v.checked_div(hundred))
            .and_then(|v| v.checked_div(input.price));
        let raw_qty = in_range(raw_qty, "주문 수량")?;
        let quantity = Self::round_quantity(raw_qty, input.constraints.qty_precision);

        let profit = input.profit_percent / hundred;
        let loss = input.loss_percent / hundred;
        let (tp_factor, sl_factor) = match input.side {
            Side::Long => (Decimal::ONE.checked_add(profit), Decimal::ONE.checked_sub(loss)),
            Side::Short => (Decimal::ONE.checked_sub(profit), Decimal::ONE.checked_add(loss)),
        };
        let tp_raw = in_range(tp_factor.and_then(|f| input.price.checked_mul(f)), "TP 가격")?;
        let sl_raw = in_range(sl_factor.and_then(|f| input.price.checked_mul(f)), "SL 가격")?;

        let tick = input.constraints.tick_precision;
        let take_profit = round_to_precision(tp_raw, tick);
        let stop_loss = round_to_precision(sl_raw, tick);
        if take_profit <= Decimal::ZERO || stop_loss <= Decimal::ZERO {
            return Err(RelayError::InvalidInput(format!(
                "TP/SL 가격이 0 이하입니다 (tp={}, sl={})",
                take_profit, stop_loss
            )));
        }

        let notional = in_range(quantity.checked_mul(input.price), "명목 가치")?;
        let notional = round_to_precision(notional, NOTIONAL_PRECISION);

        debug!(
            %raw_qty,
            %quantity,
            %take_profit,
            %stop_loss,
            %notional,
            "Position sized"
        );

        Ok(SizingResult {
            quantity,
            take_profit,
            stop_loss,
            notional,
        })
    }

    fn validate(input: &SizingInput) -> RelayResult<()> {
        if input.price <= Decimal::ZERO {
            return Err(RelayError::InvalidInput(format!(
                "가격은 0보다 커야 합니다: {}",
                input.price
            )));
        }
        if input.balance <= Decimal::ZERO {
            return Err(RelayError::InvalidInput(format!(
                "잔고는 0보다 커야 합니다: {}",
                input.balance
            )));
        }
        if input.leverage == 0 {
            return Err(RelayError::InvalidInput("레버리지는 1 이상이어야 합니다".to_string()));
        }
        if input.risk_percent <= Decimal::ZERO {
            return Err(RelayError::InvalidInput(format!(
                "risk_percent는 0보다 커야 합니다: {}",
                input.risk_percent
            )));
        }
        if input.profit_percent < Decimal::ZERO || input.loss_percent < Decimal::ZERO {
            return Err(RelayError::InvalidInput(
                "profit_percent/loss_percent는 음수일 수 없습니다".to_string(),
            ));
        }
        Ok(())
    }

    /// 수량 자릿수로 라운딩. 자릿수가 0이면 올림 없이 버립니다.
    fn round_quantity(raw: Decimal, precision: u32) -> Decimal {
        if precision == 0 {
            round_to_precision(raw.trunc(), 0)
        } else {
            round_to_precision(raw, precision)
        }
    }
}

/// Decimal 연산 결과가 표현 범위를 벗어나면 `InvalidInput`.
fn in_range(value: Option<Decimal>, what: &str) -> RelayResult<Decimal> {
    value.ok_or_else(|| RelayError::InvalidInput(format!("{} 계산이 표현 범위를 벗어났습니다", what)))
}

/// 소수 자릿수로 라운딩하고 스케일을 고정합니다 (`102` → `102.0000`).
///
/// 중간값은 가장 가까운 짝수로 보냅니다.
pub fn round_to_precision(value: Decimal, precision: u32) -> Decimal {
    let mut rounded = value.round_dp(precision);
    rounded.rescale(precision);
    rounded
}
