//! 포지션 사이징 결과.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 계좌 하나에 대한 주문 파라미터.
///
/// 모든 값은 거래소 자릿수로 스케일이 맞춰져 있어 `to_string()`이 그대로
/// 주문 파라미터가 됩니다 (예: 수량 `1`, TP `102.0000`, 명목가치 `100.00`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingResult {
    /// 주문 수량 (수량 자릿수)
    pub quantity: Decimal,
    /// 익절 가격 (호가 자릿수)
    pub take_profit: Decimal,
    /// 손절 가격 (호가 자릿수)
    pub stop_loss: Decimal,
    /// 명목 가치 = 수량 × 가격 (소수 2자리)
    pub notional: Decimal,
}

impl SizingResult {
    /// 라운딩 후 수량이 0인지 확인.
    ///
    /// 최소 주문 크기 정책은 거래소가 판단하므로 여기서는 거부하지 않습니다.
    pub fn is_empty(&self) -> bool {
        self.quantity.is_zero()
    }
}
