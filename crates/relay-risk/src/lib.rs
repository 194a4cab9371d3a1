//! 리스크 계산.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 잔고/가격/레버리지 기반 주문 수량 계산
//! - 거래소 자릿수에 맞춘 TP/SL 가격 라운딩
//!
//! # 예제
//!
//! ```rust,ignore
//! use relay_risk::{PositionSizer, SizingInput};
//!
//! let input = SizingInput::from_intent(&intent, balance, price, leverage, constraints);
//! let sizing = PositionSizer::new().size(&input)?;
//! ```

pub mod position_sizing;

pub use position_sizing::{round_to_precision, PositionSizer, SizingInput};
