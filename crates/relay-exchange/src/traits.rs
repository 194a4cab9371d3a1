//! 거래소 trait 정의.
//!
//! [`ExchangeClient`] 하나는 계좌 하나의 자격증명에 묶입니다. 디스패처는
//! 계좌마다 [`ExchangeClientFactory`]로 클라이언트를 만들고 작업이 끝나면 버립니다.

use async_trait::async_trait;
use relay_core::{
    Account, Category, ClosedPosition, InstrumentConstraints, OrderReceipt, Position,
    PositionMode, Side, SizingResult,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::{ExchangeError, ExchangeFault, ExchangeOperation};

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 심볼별 오픈 포지션. 포지션이 없으면 빈 맵입니다.
pub type PositionMap = BTreeMap<String, Position>;

/// 시장가 주문 요청.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketOrder {
    pub category: Category,
    pub symbol: String,
    pub side: Side,
    /// 주문 수량 (거래소 자릿수로 스케일 조정된 값)
    pub quantity: Decimal,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    /// 포지션 축소 전용
    pub reduce_only: bool,
    /// 클라이언트 주문 ID
    pub order_link_id: String,
}

impl MarketOrder {
    /// 사이징 결과로 신규 진입 주문 생성 (TP/SL 첨부).
    pub fn entry(
        category: Category,
        symbol: impl Into<String>,
        side: Side,
        sizing: &SizingResult,
    ) -> Self {
        Self {
            category,
            symbol: symbol.into(),
            side,
            quantity: sizing.quantity,
            take_profit: Some(sizing.take_profit),
            stop_loss: Some(sizing.stop_loss),
            reduce_only: false,
            order_link_id: new_order_link_id(),
        }
    }

    /// 포지션 전체를 닫는 반대 방향 reduce-only 주문 생성.
    pub fn closing(position: &Position) -> Self {
        Self {
            category: position.category,
            symbol: position.symbol.clone(),
            side: position.side.opposite(),
            quantity: position.size,
            take_profit: None,
            stop_loss: None,
            reduce_only: true,
            order_link_id: new_order_link_id(),
        }
    }
}

/// 클라이언트 주문 ID 생성 (거래소 제한 36자 이내).
fn new_order_link_id() -> String {
    format!("relay-{}", uuid::Uuid::new_v4().simple())
        .chars()
        .take(36)
        .collect()
}

/// 계좌 하나에 묶인 거래소 클라이언트.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 거래소 이름 반환.
    fn name(&self) -> &str;

    // === 계좌 / 시장 데이터 ===

    /// 통합 계좌의 USDT 지갑 잔고 조회.
    ///
    /// 응답에 USDT 항목이 없으면 `BalanceNotFound`를 반환합니다.
    async fn get_usdt_balance(&self) -> ExchangeResult<Decimal>;

    /// 심볼의 최종 체결가 조회.
    async fn get_last_price(&self, category: Category, symbol: &str) -> ExchangeResult<Decimal>;

    /// 심볼의 호가/수량 자릿수 조회.
    async fn get_instrument_constraints(
        &self,
        category: Category,
        symbol: &str,
    ) -> ExchangeResult<InstrumentConstraints>;

    // === 주문 / 포지션 작업 ===

    /// 시장가 주문 제출.
    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<OrderReceipt>;

    /// 오픈 포지션 조회 (수량 0 포지션 제외).
    async fn get_open_positions(
        &self,
        category: Option<Category>,
        symbol: Option<&str>,
    ) -> ExchangeResult<PositionMap>;

    /// 레버리지 변경. 이미 같은 값이면 `NotModified`를 반환합니다.
    async fn set_leverage(
        &self,
        category: Category,
        symbol: &str,
        leverage: u32,
    ) -> ExchangeResult<()>;

    /// 오픈 포지션의 TP/SL 변경. `None`인 값은 그대로 둡니다.
    async fn adjust_tp_sl(
        &self,
        category: Category,
        symbol: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> ExchangeResult<()>;

    /// 포지션 모드 변경 (one-way / hedge).
    async fn switch_position_mode(
        &self,
        category: Category,
        mode: PositionMode,
    ) -> ExchangeResult<()>;

    /// 심볼의 오픈 포지션을 reduce-only 시장가 주문으로 청산.
    ///
    /// 포지션이 없으면 `PositionNotFound`를 반환합니다.
    async fn close_position(
        &self,
        category: Category,
        symbol: &str,
    ) -> ExchangeResult<ClosedPosition> {
        let mut positions = self.get_open_positions(Some(category), Some(symbol)).await?;
        let position = positions
            .remove(symbol)
            .filter(Position::is_open)
            .ok_or_else(|| {
                ExchangeError::new(
                    ExchangeOperation::ClosePosition,
                    ExchangeFault::PositionNotFound {
                        symbol: symbol.to_string(),
                    },
                )
            })?;

        let receipt = self
            .place_market_order(&MarketOrder::closing(&position))
            .await?;

        Ok(ClosedPosition {
            pnl: position.unrealised_pnl,
            position,
            receipt,
        })
    }
}

/// 계좌별 거래소 클라이언트 생성기.
pub trait ExchangeClientFactory: Send + Sync {
    /// 계좌 자격증명으로 클라이언트 생성.
    ///
    /// 실패는 해당 계좌의 결과에만 영향을 줍니다.
    fn create(&self, account: &Account) -> ExchangeResult<Box<dyn ExchangeClient>>;
}
