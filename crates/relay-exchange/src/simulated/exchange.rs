//! 시뮬레이션 거래소 클라이언트와 팩토리.

use async_trait::async_trait;
use relay_core::{Account, Category, InstrumentConstraints, OrderReceipt, PositionMode};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use super::venue::SimulatedVenue;
use crate::traits::{
    ExchangeClient, ExchangeClientFactory, ExchangeResult, MarketOrder, PositionMap,
};
use crate::{ExchangeError, ExchangeFault, ExchangeOperation};

/// [`SimulatedVenue`]에 연결된 거래소 클라이언트.
pub struct SimulatedExchange {
    venue: Arc<SimulatedVenue>,
}

impl SimulatedExchange {
    pub fn new(venue: Arc<SimulatedVenue>) -> Self {
        Self { venue }
    }
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn get_usdt_balance(&self) -> ExchangeResult<Decimal> {
        self.venue.usdt_balance().await
    }

    async fn get_last_price(&self, _category: Category, symbol: &str) -> ExchangeResult<Decimal> {
        self.venue.last_price(symbol).await
    }

    async fn get_instrument_constraints(
        &self,
        _category: Category,
        symbol: &str,
    ) -> ExchangeResult<InstrumentConstraints> {
        self.venue.constraints(symbol).await
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<OrderReceipt> {
        self.venue.place(order).await
    }

    async fn get_open_positions(
        &self,
        category: Option<Category>,
        symbol: Option<&str>,
    ) -> ExchangeResult<PositionMap> {
        self.venue.open_positions(category, symbol).await
    }

    async fn set_leverage(
        &self,
        _category: Category,
        symbol: &str,
        leverage: u32,
    ) -> ExchangeResult<()> {
        self.venue.set_leverage(symbol, leverage).await
    }

    async fn adjust_tp_sl(
        &self,
        _category: Category,
        symbol: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> ExchangeResult<()> {
        self.venue.set_trading_stop(symbol, take_profit, stop_loss).await
    }

    async fn switch_position_mode(
        &self,
        _category: Category,
        mode: PositionMode,
    ) -> ExchangeResult<()> {
        self.venue.switch_mode(mode).await
    }
}

/// 계좌 ID별 시뮬레이션 거래소 팩토리.
///
/// 등록되지 않은 계좌는 클라이언트 생성에 실패합니다.
#[derive(Default)]
pub struct SimulatedExchangeFactory {
    venues: HashMap<String, Arc<SimulatedVenue>>,
}

impl SimulatedExchangeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 계좌에 거래소 상태 연결.
    pub fn with_venue(mut self, account_id: impl Into<String>, venue: SimulatedVenue) -> Self {
        self.venues.insert(account_id.into(), Arc::new(venue));
        self
    }

    /// 계좌의 거래소 상태 조회 (테스트 검증용).
    pub fn venue(&self, account_id: &str) -> Option<Arc<SimulatedVenue>> {
        self.venues.get(account_id).cloned()
    }
}

impl ExchangeClientFactory for SimulatedExchangeFactory {
    fn create(&self, account: &Account) -> ExchangeResult<Box<dyn ExchangeClient>> {
        let venue = self.venues.get(&account.id).cloned().ok_or_else(|| {
            ExchangeError::new(
                ExchangeOperation::Connect,
                ExchangeFault::Unauthorized(format!("no venue for account {}", account.id)),
            )
        })?;
        Ok(Box::new(SimulatedExchange::new(venue)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::VenueStage;
    use relay_core::{Position, Side};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn venue() -> SimulatedVenue {
        SimulatedVenue::new()
            .with_balance("USDT", dec!(1000))
            .with_market("BTCUSDT", dec!(100), InstrumentConstraints::new(4, 0))
    }

    #[tokio::test]
    async fn test_balance_and_market_reads() {
        let exchange = SimulatedExchange::new(Arc::new(venue()));

        assert_eq!(exchange.get_usdt_balance().await.unwrap(), dec!(1000));
        assert_eq!(
            exchange.get_last_price(Category::Linear, "BTCUSDT").await.unwrap(),
            dec!(100)
        );
        let err = exchange
            .get_last_price(Category::Linear, "ETHUSDT")
            .await
            .unwrap_err();
        assert!(matches!(err.cause, ExchangeFault::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_missing_usdt_is_balance_not_found() {
        let exchange = SimulatedExchange::new(Arc::new(
            SimulatedVenue::new().with_balance("BTC", dec!(1)),
        ));

        let err = exchange.get_usdt_balance().await.unwrap_err();
        assert_eq!(err.to_string(), "get_balance: balance_not_found: USDT");
    }

    #[tokio::test]
    async fn test_order_then_close_flattens_position() {
        let venue = Arc::new(venue());
        let exchange = SimulatedExchange::new(venue.clone());

        let order = MarketOrder {
            category: Category::Linear,
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            quantity: dec!(2),
            take_profit: Some(dec!(102)),
            stop_loss: Some(dec!(99)),
            reduce_only: false,
            order_link_id: "link-1".to_string(),
        };
        exchange.place_market_order(&order).await.unwrap();

        let positions = exchange.get_open_positions(None, None).await.unwrap();
        assert_eq!(positions["BTCUSDT"].size, dec!(2));
        assert_eq!(positions["BTCUSDT"].take_profit, Some(dec!(102)));

        let closed = exchange
            .close_position(Category::Linear, "BTCUSDT")
            .await
            .unwrap();
        assert_eq!(closed.position.side, Side::Long);
        assert!(venue.position("BTCUSDT").await.is_none());

        let orders = venue.orders().await;
        assert_eq!(orders.len(), 2);
        assert!(orders[1].reduce_only);
        assert_eq!(orders[1].side, Side::Short);
    }

    #[tokio::test]
    async fn test_close_without_position_is_not_found() {
        let exchange = SimulatedExchange::new(Arc::new(venue()));
        let err = exchange
            .close_position(Category::Linear, "BTCUSDT")
            .await
            .unwrap_err();
        assert!(matches!(err.cause, ExchangeFault::PositionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_same_leverage_is_not_modified() {
        let exchange = SimulatedExchange::new(Arc::new(venue().with_leverage("BTCUSDT", 5)));

        let err = exchange
            .set_leverage(Category::Linear, "BTCUSDT", 5)
            .await
            .unwrap_err();
        assert!(err.is_not_modified());
        assert!(exchange.set_leverage(Category::Linear, "BTCUSDT", 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_fault_injection_is_per_stage() {
        let venue = Arc::new(
            venue().with_fault(VenueStage::Price, ExchangeFault::Network("down".to_string())),
        );
        let exchange = SimulatedExchange::new(venue.clone());

        assert!(exchange.get_usdt_balance().await.is_ok());
        let err = exchange
            .get_last_price(Category::Linear, "BTCUSDT")
            .await
            .unwrap_err();
        assert_eq!(err.operation, ExchangeOperation::GetPrice);
        assert_eq!(venue.call_count(VenueStage::Price).await, 1);

        venue.clear_fault(VenueStage::Price).await;
        assert!(exchange.get_last_price(Category::Linear, "BTCUSDT").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let exchange = SimulatedExchange::new(Arc::new(
            venue().with_stage_latency(VenueStage::Balance, Duration::from_secs(5)),
        ));

        let started = tokio::time::Instant::now();
        exchange.get_usdt_balance().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_tp_sl_requires_position() {
        let venue = Arc::new(venue().with_position(Position::new(
            "BTCUSDT",
            Category::Linear,
            Side::Short,
            dec!(1),
            dec!(100),
        )));
        let exchange = SimulatedExchange::new(venue.clone());

        exchange
            .adjust_tp_sl(Category::Linear, "BTCUSDT", Some(dec!(95)), None)
            .await
            .unwrap();
        assert_eq!(
            venue.position("BTCUSDT").await.unwrap().take_profit,
            Some(dec!(95))
        );

        let err = exchange
            .adjust_tp_sl(Category::Linear, "ETHUSDT", Some(dec!(95)), None)
            .await
            .unwrap_err();
        assert!(matches!(err.cause, ExchangeFault::Rejected(_)));
    }

    #[test]
    fn test_factory_rejects_unknown_account() {
        let factory = SimulatedExchangeFactory::new().with_venue("alice", venue());

        assert!(factory.create(&Account::new("alice", "k", "s")).is_ok());
        let err = factory.create(&Account::new("mallory", "k", "s")).err().unwrap();
        assert_eq!(err.operation, ExchangeOperation::Connect);
    }
}
