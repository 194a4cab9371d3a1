//! 계좌 하나의 인메모리 거래소 상태.
//!
//! 단계별 장애 주입과 인위적 지연을 지원하므로 디스패처의 격리/타임아웃
//! 동작을 실제 거래소 없이 검증할 수 있습니다.

use relay_core::{Category, InstrumentConstraints, OrderReceipt, Position, PositionMode};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::traits::{ExchangeResult, MarketOrder, PositionMap};
use crate::{ExchangeError, ExchangeFault, ExchangeOperation};

const SETTLE_COIN: &str = "USDT";

/// 장애 주입 단위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VenueStage {
    Balance,
    Price,
    Instrument,
    PlaceOrder,
    Positions,
    Leverage,
    TradingStop,
    PositionMode,
}

impl VenueStage {
    fn operation(&self) -> ExchangeOperation {
        match self {
            VenueStage::Balance => ExchangeOperation::GetBalance,
            VenueStage::Price => ExchangeOperation::GetPrice,
            VenueStage::Instrument => ExchangeOperation::GetInstrument,
            VenueStage::PlaceOrder => ExchangeOperation::PlaceOrder,
            VenueStage::Positions => ExchangeOperation::GetPositions,
            VenueStage::Leverage => ExchangeOperation::SetLeverage,
            VenueStage::TradingStop => ExchangeOperation::SetTradingStop,
            VenueStage::PositionMode => ExchangeOperation::SwitchPositionMode,
        }
    }
}

/// 내부 상태.
#[derive(Debug)]
struct VenueState {
    /// 코인별 지갑 잔고
    coins: HashMap<String, Decimal>,
    /// 심볼별 최종 체결가
    prices: HashMap<String, Decimal>,
    constraints: HashMap<String, InstrumentConstraints>,
    positions: BTreeMap<String, Position>,
    leverage: HashMap<String, u32>,
    mode: PositionMode,
    /// 접수된 주문 이력
    orders: Vec<MarketOrder>,
    /// 단계별 주입된 장애
    faults: HashMap<VenueStage, ExchangeFault>,
    /// 모든 단계 공통 지연
    latency: Duration,
    stage_latency: HashMap<VenueStage, Duration>,
    calls: HashMap<VenueStage, u32>,
}

impl Default for VenueState {
    fn default() -> Self {
        Self {
            coins: HashMap::new(),
            prices: HashMap::new(),
            constraints: HashMap::new(),
            positions: BTreeMap::new(),
            leverage: HashMap::new(),
            mode: PositionMode::OneWay,
            orders: Vec::new(),
            faults: HashMap::new(),
            latency: Duration::ZERO,
            stage_latency: HashMap::new(),
            calls: HashMap::new(),
        }
    }
}

impl VenueState {
    fn latency_for(&self, stage: VenueStage) -> Duration {
        self.stage_latency.get(&stage).copied().unwrap_or(self.latency)
    }
}

/// 시뮬레이션 거래소 계좌.
#[derive(Debug, Default)]
pub struct SimulatedVenue {
    state: RwLock<VenueState>,
}

impl SimulatedVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 코인 잔고 설정.
    pub fn with_balance(mut self, asset: &str, amount: Decimal) -> Self {
        self.state.get_mut().coins.insert(asset.to_string(), amount);
        self
    }

    /// 심볼 시세와 자릿수 설정.
    pub fn with_market(
        mut self,
        symbol: &str,
        last_price: Decimal,
        constraints: InstrumentConstraints,
    ) -> Self {
        let state = self.state.get_mut();
        state.prices.insert(symbol.to_string(), last_price);
        state.constraints.insert(symbol.to_string(), constraints);
        self
    }

    /// 오픈 포지션 추가.
    pub fn with_position(mut self, position: Position) -> Self {
        self.state
            .get_mut()
            .positions
            .insert(position.symbol.clone(), position);
        self
    }

    /// 현재 레버리지 설정.
    pub fn with_leverage(mut self, symbol: &str, leverage: u32) -> Self {
        self.state.get_mut().leverage.insert(symbol.to_string(), leverage);
        self
    }

    /// 초기 포지션 모드 설정.
    pub fn with_position_mode(mut self, mode: PositionMode) -> Self {
        self.state.get_mut().mode = mode;
        self
    }

    /// 단계에 장애 주입.
    pub fn with_fault(mut self, stage: VenueStage, fault: ExchangeFault) -> Self {
        self.state.get_mut().faults.insert(stage, fault);
        self
    }

    /// 모든 단계에 지연 추가.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.state.get_mut().latency = latency;
        self
    }

    /// 특정 단계에만 지연 추가.
    pub fn with_stage_latency(mut self, stage: VenueStage, latency: Duration) -> Self {
        self.state.get_mut().stage_latency.insert(stage, latency);
        self
    }

    /// 실행 중 장애 주입.
    pub async fn inject_fault(&self, stage: VenueStage, fault: ExchangeFault) {
        self.state.write().await.faults.insert(stage, fault);
    }

    /// 주입된 장애 제거.
    pub async fn clear_fault(&self, stage: VenueStage) {
        self.state.write().await.faults.remove(&stage);
    }

    /// 단계 호출 횟수.
    pub async fn call_count(&self, stage: VenueStage) -> u32 {
        self.state.read().await.calls.get(&stage).copied().unwrap_or(0)
    }

    /// 접수된 주문 이력.
    pub async fn orders(&self) -> Vec<MarketOrder> {
        self.state.read().await.orders.clone()
    }

    pub async fn position(&self, symbol: &str) -> Option<Position> {
        self.state.read().await.positions.get(symbol).cloned()
    }

    pub async fn leverage(&self, symbol: &str) -> Option<u32> {
        self.state.read().await.leverage.get(symbol).copied()
    }

    pub async fn position_mode(&self) -> PositionMode {
        self.state.read().await.mode
    }

    /// 단계 진입: 지연 후 호출 횟수를 기록하고 주입된 장애를 반환합니다.
    ///
    /// 지연 중에는 잠금을 잡지 않습니다.
    async fn enter(&self, stage: VenueStage) -> ExchangeResult<()> {
        let latency = self.state.read().await.latency_for(stage);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.write().await;
        *state.calls.entry(stage).or_insert(0) += 1;
        match state.faults.get(&stage) {
            Some(fault) => Err(ExchangeError::new(stage.operation(), fault.clone())),
            None => Ok(()),
        }
    }

    pub(crate) async fn usdt_balance(&self) -> ExchangeResult<Decimal> {
        self.enter(VenueStage::Balance).await?;
        self.state
            .read()
            .await
            .coins
            .get(SETTLE_COIN)
            .copied()
            .ok_or_else(|| {
                ExchangeError::new(
                    ExchangeOperation::GetBalance,
                    ExchangeFault::BalanceNotFound {
                        asset: SETTLE_COIN.to_string(),
                    },
                )
            })
    }

    pub(crate) async fn last_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.enter(VenueStage::Price).await?;
        self.state
            .read()
            .await
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::malformed(ExchangeOperation::GetPrice, "empty ticker list"))
    }

    pub(crate) async fn constraints(&self, symbol: &str) -> ExchangeResult<InstrumentConstraints> {
        self.enter(VenueStage::Instrument).await?;
        self.state
            .read()
            .await
            .constraints
            .get(symbol)
            .copied()
            .ok_or_else(|| {
                ExchangeError::malformed(ExchangeOperation::GetInstrument, "empty instrument list")
            })
    }

    pub(crate) async fn place(&self, order: &MarketOrder) -> ExchangeResult<OrderReceipt> {
        self.enter(VenueStage::PlaceOrder).await?;
        let rejected = |msg: &str| {
            ExchangeError::new(
                ExchangeOperation::PlaceOrder,
                ExchangeFault::Rejected(msg.to_string()),
            )
        };

        if order.quantity <= Decimal::ZERO {
            return Err(rejected("order qty is zero"));
        }

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let price = state.prices.get(&order.symbol).copied().unwrap_or(Decimal::ZERO);
        let leverage = state.leverage.get(&order.symbol).copied().unwrap_or(1);

        match state.positions.get_mut(&order.symbol) {
            Some(position) if position.side == order.side => {
                if order.reduce_only {
                    return Err(rejected("reduce-only order would increase position"));
                }
                let total = position.size + order.quantity;
                position.avg_price =
                    (position.avg_price * position.size + price * order.quantity) / total;
                position.size = total;
            }
            Some(position) => {
                let remaining = position.size - order.quantity;
                if remaining > Decimal::ZERO {
                    position.size = remaining;
                } else if remaining.is_zero() || order.reduce_only {
                    state.positions.remove(&order.symbol);
                } else {
                    position.side = order.side;
                    position.size = -remaining;
                    position.avg_price = price;
                }
            }
            None if order.reduce_only => {
                return Err(rejected("reduce-only order has no position"));
            }
            None => {
                let mut position = Position::new(
                    order.symbol.clone(),
                    order.category,
                    order.side,
                    order.quantity,
                    price,
                );
                position.leverage = Decimal::from(leverage);
                position.take_profit = order.take_profit;
                position.stop_loss = order.stop_loss;
                state.positions.insert(order.symbol.clone(), position);
            }
        }

        state.orders.push(order.clone());
        Ok(OrderReceipt {
            order_id: format!("sim-{}", state.orders.len()),
            order_link_id: order.order_link_id.clone(),
        })
    }

    pub(crate) async fn open_positions(
        &self,
        category: Option<Category>,
        symbol: Option<&str>,
    ) -> ExchangeResult<PositionMap> {
        self.enter(VenueStage::Positions).await?;
        let state = self.state.read().await;
        Ok(state
            .positions
            .iter()
            .filter(|(key, position)| {
                symbol.is_none_or(|s| s == key.as_str())
                    && category.is_none_or(|c| c == position.category)
                    && position.is_open()
            })
            .map(|(key, position)| (key.clone(), position.clone()))
            .collect())
    }

    pub(crate) async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        self.enter(VenueStage::Leverage).await?;
        let mut state = self.state.write().await;
        if state.leverage.get(symbol) == Some(&leverage) {
            return Err(ExchangeError::new(
                ExchangeOperation::SetLeverage,
                ExchangeFault::NotModified("leverage not modified".to_string()),
            ));
        }

        state.leverage.insert(symbol.to_string(), leverage);
        if let Some(position) = state.positions.get_mut(symbol) {
            position.leverage = Decimal::from(leverage);
        }
        Ok(())
    }

    pub(crate) async fn set_trading_stop(
        &self,
        symbol: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> ExchangeResult<()> {
        self.enter(VenueStage::TradingStop).await?;
        let mut state = self.state.write().await;
        let position = state.positions.get_mut(symbol).ok_or_else(|| {
            ExchangeError::new(
                ExchangeOperation::SetTradingStop,
                ExchangeFault::Rejected("can not set tp/sl/ts for zero position".to_string()),
            )
        })?;

        let unchanged = take_profit.is_none_or(|tp| position.take_profit == Some(tp))
            && stop_loss.is_none_or(|sl| position.stop_loss == Some(sl));
        if unchanged {
            return Err(ExchangeError::new(
                ExchangeOperation::SetTradingStop,
                ExchangeFault::NotModified("not modified".to_string()),
            ));
        }

        if take_profit.is_some() {
            position.take_profit = take_profit;
        }
        if stop_loss.is_some() {
            position.stop_loss = stop_loss;
        }
        Ok(())
    }

    pub(crate) async fn switch_mode(&self, mode: PositionMode) -> ExchangeResult<()> {
        self.enter(VenueStage::PositionMode).await?;
        let mut state = self.state.write().await;
        if state.mode == mode {
            return Err(ExchangeError::new(
                ExchangeOperation::SwitchPositionMode,
                ExchangeFault::NotModified("position mode is not modified".to_string()),
            ));
        }
        state.mode = mode;
        Ok(())
    }
}
