//! 거래소에서 조회하는 시장/계좌 데이터.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::intent::{Category, Side};

/// 심볼별 거래소 제약 조건.
///
/// 매 작업마다 새로 조회하며 요청 간에 캐싱하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentConstraints {
    /// TP/SL 가격 라운딩 소수 자릿수
    pub tick_precision: u32,
    /// 주문 수량 소수 자릿수 (0이면 정수 단위만 허용)
    pub qty_precision: u32,
}

impl InstrumentConstraints {
    pub fn new(tick_precision: u32, qty_precision: u32) -> Self {
        Self {
            tick_precision,
            qty_precision,
        }
    }

    /// 호가 단위와 수량 단위에서 자릿수를 계산합니다.
    ///
    /// 예: tick_size `0.10` → 1, qty_step `0.001` → 3, qty_step `1` → 0
    pub fn from_steps(tick_size: Decimal, qty_step: Decimal) -> Self {
        Self {
            tick_precision: step_precision(tick_size),
            qty_precision: step_precision(qty_step),
        }
    }
}

/// 단위 값의 소수 자릿수 (후행 0 제외).
pub fn step_precision(step: Decimal) -> u32 {
    step.normalize().scale()
}

/// 주문 제출 확인.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    /// 거래소 주문 ID
    pub order_id: String,
    /// 클라이언트 주문 ID
    pub order_link_id: String,
}

/// 오픈 포지션 스냅샷.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub category: Category,
    pub side: Side,
    /// 포지션 수량
    pub size: Decimal,
    /// 평균 진입가
    pub avg_price: Decimal,
    pub leverage: Decimal,
    /// 강제청산 가격
    pub liq_price: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    /// 포지션 가치
    pub position_value: Decimal,
    /// 실현 손익
    pub realised_pnl: Decimal,
    /// 미실현 손익
    pub unrealised_pnl: Decimal,
    /// 마크 가격
    pub mark_price: Decimal,
}

impl Position {
    /// 최소 필드만 채운 포지션 생성.
    pub fn new(
        symbol: impl Into<String>,
        category: Category,
        side: Side,
        size: Decimal,
        avg_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            category,
            side,
            size,
            avg_price,
            leverage: Decimal::ONE,
            liq_price: None,
            take_profit: None,
            stop_loss: None,
            position_value: size * avg_price,
            realised_pnl: Decimal::ZERO,
            unrealised_pnl: Decimal::ZERO,
            mark_price: avg_price,
        }
    }

    /// 포지션이 열려 있는지 확인.
    pub fn is_open(&self) -> bool {
        self.size > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_constraints_from_steps() {
        let c = InstrumentConstraints::from_steps(dec!(0.10), dec!(0.001));
        assert_eq!(c, InstrumentConstraints::new(1, 3));

        let c = InstrumentConstraints::from_steps(dec!(0.0001), dec!(1));
        assert_eq!(c, InstrumentConstraints::new(4, 0));

        let c = InstrumentConstraints::from_steps(dec!(0.5), dec!(10));
        assert_eq!(c.qty_precision, 0);
    }
}
