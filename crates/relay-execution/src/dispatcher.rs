//! 주문 디스패처.
//!
//! 디스패치 한 번은 계좌마다 독립된 tokio 작업을 하나씩 띄웁니다.
//! - 각 작업은 자기 계좌의 거래소 클라이언트를 직접 만들어 씁니다
//! - 작업 안의 단계는 순차 실행 (잔고 → 가격 → 종목 → 사이징 → 제출)
//! - 어느 단계의 실패든 그 계좌의 `Failure`가 되고 다른 계좌에 영향을 주지 않습니다
//! - 계좌마다 개별 타임아웃이 걸리며 타임아웃도 `Failure`로 기록됩니다
//!
//! 모든 작업이 종료 상태에 도달하면 결과를 완료 순서대로 집계합니다.

use futures::stream::{FuturesUnordered, StreamExt};
use relay_core::{
    Account, AccountOutcome, ClosedPosition, CloseRequest, DispatchAction, DispatchConfig,
    DispatchEnvelope, ExchangeError, ExchangeFault, ExchangeOperation, LeverageChange,
    LeverageRequest, OrderPlacement, OutcomePayload, Position, PositionModeChange,
    PositionModeRequest, PositionQuery, PositionsSnapshot, BalanceSnapshot, RelayError,
    RelayResult, TradingIntent, TradingStopChange, TradingStopRequest,
};
use relay_exchange::{
    with_retry, ExchangeClient, ExchangeClientFactory, ExchangeResult, MarketOrder, RetryConfig,
};
use relay_risk::{round_to_precision, PositionSizer, SizingInput};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::aggregator::ResultAggregator;
use crate::registry::{AccountRegistry, AccountSelection};

/// 계좌 파이프라인이 수행할 작업.
#[derive(Debug, Clone)]
enum Job {
    PlaceOrder(TradingIntent),
    Close(CloseRequest),
    Leverage(LeverageRequest),
    TradingStop(TradingStopRequest),
    Balance,
    Positions(PositionQuery),
    PositionMode(PositionModeRequest),
}

impl Job {
    fn action(&self) -> DispatchAction {
        match self {
            Job::PlaceOrder(_) => DispatchAction::PlaceOrder,
            Job::Close(_) => DispatchAction::CloseOrder,
            Job::Leverage(_) => DispatchAction::SetLeverage,
            Job::TradingStop(_) => DispatchAction::AdjustTpSl,
            Job::Balance => DispatchAction::GetBalance,
            Job::Positions(_) => DispatchAction::GetPositions,
            Job::PositionMode(_) => DispatchAction::SwitchPositionMode,
        }
    }
}

/// 다중 계좌 주문 디스패처.
pub struct OrderDispatcher {
    registry: Arc<dyn AccountRegistry>,
    factory: Arc<dyn ExchangeClientFactory>,
    sizer: PositionSizer,
    retry: RetryConfig,
    account_timeout: Duration,
}

impl OrderDispatcher {
    pub fn new(
        registry: Arc<dyn AccountRegistry>,
        factory: Arc<dyn ExchangeClientFactory>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            registry,
            factory,
            sizer: PositionSizer::new(),
            retry: RetryConfig::from_dispatch(config),
            account_timeout: config.account_timeout(),
        }
    }

    pub fn registry(&self) -> &Arc<dyn AccountRegistry> {
        &self.registry
    }

    // === 주문 변경 작업 (활성 계좌만) ===

    /// 모든 활성 계좌에 시장가 주문 제출.
    pub async fn place_order(&self, intent: TradingIntent) -> RelayResult<DispatchEnvelope> {
        intent.validate()?;
        self.dispatch(Job::PlaceOrder(intent)).await
    }

    /// 모든 활성 계좌의 심볼 포지션 청산.
    pub async fn close_order(&self, request: CloseRequest) -> RelayResult<DispatchEnvelope> {
        request.validate()?;
        self.dispatch(Job::Close(request)).await
    }

    /// 모든 활성 계좌의 레버리지 변경.
    pub async fn set_leverage(&self, request: LeverageRequest) -> RelayResult<DispatchEnvelope> {
        request.validate()?;
        self.dispatch(Job::Leverage(request)).await
    }

    /// 모든 활성 계좌의 오픈 포지션 TP/SL 변경.
    pub async fn adjust_tp_sl(
        &self,
        request: TradingStopRequest,
    ) -> RelayResult<DispatchEnvelope> {
        request.validate()?;
        self.dispatch(Job::TradingStop(request)).await
    }

    /// 모든 활성 계좌의 포지션 모드 변경 (원웨이 모드만 허용).
    pub async fn switch_position_mode(
        &self,
        request: PositionModeRequest,
    ) -> RelayResult<DispatchEnvelope> {
        request.validate()?;
        self.dispatch(Job::PositionMode(request)).await
    }

    // === 조회 작업 (모든 계좌) ===

    /// 모든 계좌의 USDT 잔고 조회.
    pub async fn get_balances(&self) -> RelayResult<DispatchEnvelope> {
        self.dispatch(Job::Balance).await
    }

    /// 모든 계좌의 오픈 포지션 조회.
    pub async fn get_positions(&self, query: PositionQuery) -> RelayResult<DispatchEnvelope> {
        query.validate()?;
        self.dispatch(Job::Positions(query)).await
    }

    /// 계좌별 작업을 동시에 실행하고 결과를 집계합니다.
    ///
    /// 계좌 실패로는 실패하지 않으며, 저장소 조회 실패만 에러로 반환합니다.
    async fn dispatch(&self, job: Job) -> RelayResult<DispatchEnvelope> {
        let action = job.action();
        let registered = self.registry.accounts().await?;
        let total_count = registered.len();

        let selection = AccountSelection::for_action(action);
        let selected: Vec<Account> = registered
            .into_iter()
            .filter(|account| selection.includes(account))
            .collect();

        info!(
            %action,
            registered = total_count,
            selected = selected.len(),
            "Dispatching to accounts"
        );

        let job = Arc::new(job);
        let mut pending = FuturesUnordered::new();
        for account in selected {
            let account_id = account.id.clone();
            let span = info_span!("account", account_id = %account.id, %action);
            let pipeline = Pipeline {
                job: Arc::clone(&job),
                factory: Arc::clone(&self.factory),
                sizer: self.sizer,
                retry: self.retry.clone(),
            };
            let timeout = self.account_timeout;

            let handle = tokio::spawn(
                async move {
                    match tokio::time::timeout(timeout, pipeline.run(account)).await {
                        Ok(result) => result,
                        Err(_) => Err(RelayError::from(ExchangeError::new(
                            ExchangeOperation::Dispatch,
                            ExchangeFault::Timeout(format!(
                                "account pipeline exceeded {}ms",
                                timeout.as_millis()
                            )),
                        ))),
                    }
                }
                .instrument(span),
            );

            pending.push(async move { (account_id, handle.await) });
        }

        let mut aggregator = ResultAggregator::new(action, total_count);
        while let Some((account_id, joined)) = pending.next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(RelayError::Internal(format!("계좌 작업 중단: {}", e)))
            });

            match &result {
                Ok(_) => debug!(%action, account_id = %account_id, "Account pipeline succeeded"),
                Err(e) => warn!(
                    %action,
                    account_id = %account_id,
                    kind = ?e.kind(),
                    error = %e,
                    "Account pipeline failed"
                ),
            }
            aggregator.record(AccountOutcome::from_result(account_id, result));
        }

        Ok(aggregator.finish())
    }
}

/// 계좌 하나의 파이프라인.
///
/// 공유하는 값은 읽기 전용 작업 정의와 팩토리뿐입니다.
struct Pipeline {
    job: Arc<Job>,
    factory: Arc<dyn ExchangeClientFactory>,
    sizer: PositionSizer,
    retry: RetryConfig,
}

impl Pipeline {
    async fn run(self, account: Account) -> RelayResult<OutcomePayload> {
        let client = self.factory.create(&account)?;
        let client = client.as_ref();

        match self.job.as_ref() {
            Job::PlaceOrder(intent) => self.place_order(&account, client, intent).await,
            Job::Close(request) => self.close_position(client, request).await,
            Job::Leverage(request) => self.set_leverage(client, request).await,
            Job::TradingStop(request) => self.adjust_tp_sl(client, request).await,
            Job::Balance => self.balance(&account, client).await,
            Job::Positions(query) => self.positions(client, query).await,
            Job::PositionMode(request) => self.position_mode(client, request).await,
        }
    }

    /// 잔고 → 가격 → 종목 → 사이징 → 제출.
    async fn place_order(
        &self,
        account: &Account,
        client: &dyn ExchangeClient,
        intent: &TradingIntent,
    ) -> RelayResult<OutcomePayload> {
        let symbol = intent.symbol.as_str();

        let balance = with_retry(&self.retry, || client.get_usdt_balance()).await?;
        let price = with_retry(&self.retry, || client.get_last_price(intent.category, symbol)).await?;
        let constraints = with_retry(&self.retry, || {
            client.get_instrument_constraints(intent.category, symbol)
        })
        .await?;

        let leverage = account
            .leverage_for(symbol)
            .or(intent.leverage)
            .unwrap_or(1);
        let sizing = self.sizer.size(&SizingInput::from_intent(
            intent,
            balance,
            price,
            leverage,
            constraints,
        ))?;

        if sizing.is_empty() {
            return Err(RelayError::InvalidInput(format!(
                "주문 수량이 0입니다 (balance={}, price={}, leverage={})",
                balance, price, leverage
            )));
        }

        let order = MarketOrder::entry(intent.category, symbol, intent.side, &sizing);
        let receipt = client.place_market_order(&order).await?;

        info!(
            symbol,
            side = %intent.side,
            leverage,
            qty = %sizing.quantity,
            notional = %sizing.notional,
            order_id = %receipt.order_id,
            "Order placed"
        );

        Ok(OutcomePayload::OrderPlaced(OrderPlacement {
            symbol: intent.symbol.clone(),
            side: intent.side,
            leverage,
            sizing,
            receipt,
        }))
    }

    async fn close_position(
        &self,
        client: &dyn ExchangeClient,
        request: &CloseRequest,
    ) -> RelayResult<OutcomePayload> {
        let closed: ClosedPosition = client
            .close_position(request.category, &request.symbol)
            .await?;

        info!(
            symbol = %request.symbol,
            size = %closed.position.size,
            pnl = %closed.pnl,
            "Position closed"
        );
        Ok(OutcomePayload::PositionClosed(closed))
    }

    async fn set_leverage(
        &self,
        client: &dyn ExchangeClient,
        request: &LeverageRequest,
    ) -> RelayResult<OutcomePayload> {
        let changed = not_modified_as_unchanged(
            client
                .set_leverage(request.category, &request.symbol, request.leverage)
                .await,
        )?;

        info!(symbol = %request.symbol, leverage = request.leverage, changed, "Leverage set");
        Ok(OutcomePayload::Leverage(LeverageChange {
            symbol: request.symbol.clone(),
            leverage: request.leverage,
            changed,
        }))
    }

    /// 오픈 포지션 확인 → 호가 자릿수 라운딩 → TP/SL 변경.
    async fn adjust_tp_sl(
        &self,
        client: &dyn ExchangeClient,
        request: &TradingStopRequest,
    ) -> RelayResult<OutcomePayload> {
        let symbol = request.symbol.as_str();

        let positions = with_retry(&self.retry, || {
            client.get_open_positions(Some(request.category), Some(symbol))
        })
        .await?;
        if !positions.get(symbol).is_some_and(Position::is_open) {
            return Err(RelayError::NotFound(format!("{} 포지션 없음", symbol)));
        }

        let constraints = with_retry(&self.retry, || {
            client.get_instrument_constraints(request.category, symbol)
        })
        .await?;
        let tick = constraints.tick_precision;
        let take_profit = request.take_profit.map(|p| round_to_precision(p, tick));
        let stop_loss = request.stop_loss.map(|p| round_to_precision(p, tick));

        let changed = not_modified_as_unchanged(
            client
                .adjust_tp_sl(request.category, symbol, take_profit, stop_loss)
                .await,
        )?;

        info!(symbol, ?take_profit, ?stop_loss, changed, "TP/SL adjusted");
        Ok(OutcomePayload::TradingStop(TradingStopChange {
            symbol: request.symbol.clone(),
            take_profit,
            stop_loss,
            changed,
        }))
    }

    async fn balance(
        &self,
        account: &Account,
        client: &dyn ExchangeClient,
    ) -> RelayResult<OutcomePayload> {
        let balance = with_retry(&self.retry, || client.get_usdt_balance()).await?;

        Ok(OutcomePayload::Balance(BalanceSnapshot {
            balance,
            environment: account.environment,
            active: account.active,
        }))
    }

    async fn positions(
        &self,
        client: &dyn ExchangeClient,
        query: &PositionQuery,
    ) -> RelayResult<OutcomePayload> {
        let positions = with_retry(&self.retry, || {
            client.get_open_positions(query.category, query.symbol.as_deref())
        })
        .await?;

        debug!(count = positions.len(), "Positions fetched");
        Ok(OutcomePayload::Positions(PositionsSnapshot { positions }))
    }

    async fn position_mode(
        &self,
        client: &dyn ExchangeClient,
        request: &PositionModeRequest,
    ) -> RelayResult<OutcomePayload> {
        let changed = not_modified_as_unchanged(
            client
                .switch_position_mode(request.category, request.mode)
                .await,
        )?;

        info!(mode = ?request.mode, changed, "Position mode switched");
        Ok(OutcomePayload::PositionMode(PositionModeChange {
            mode: request.mode,
            changed,
        }))
    }
}

/// 거래소의 "변경 없음" 거부를 성공으로 변환합니다.
///
/// `Ok(true)`는 변경됨, `Ok(false)`는 이미 요청한 값이었음을 뜻합니다.
fn not_modified_as_unchanged(result: ExchangeResult<()>) -> RelayResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_modified() => {
            debug!(operation = %e.operation, "Exchange reported no change");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
