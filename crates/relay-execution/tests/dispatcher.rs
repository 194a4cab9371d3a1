//! 다중 계좌 디스패치 통합 테스트 (시뮬레이션 거래소 사용).

use relay_core::{
    Account, AccountOutcome, CloseRequest, DispatchAction, DispatchConfig, ErrorKind,
    ExchangeFault, InstrumentConstraints, LeverageRequest, OutcomePayload, Position,
    PositionMode, PositionModeRequest, PositionQuery, Side, TradingIntent, TradingStopRequest,
};
use relay_exchange::{SimulatedExchangeFactory, SimulatedVenue, VenueStage};
use relay_execution::{InMemoryAccountRegistry, OrderDispatcher};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn venue() -> SimulatedVenue {
    SimulatedVenue::new()
        .with_balance("USDT", dec!(1000))
        .with_market("BTCUSDT", dec!(100), InstrumentConstraints::new(4, 0))
}

fn btc_long(size: rust_decimal::Decimal) -> Position {
    Position::new("BTCUSDT", Default::default(), Side::Long, size, dec!(100))
}

fn intent() -> TradingIntent {
    TradingIntent::new("BTCUSDT", Side::Long, dec!(10), dec!(2), dec!(1))
}

fn dispatcher_with(
    accounts: Vec<Account>,
    factory: SimulatedExchangeFactory,
    config: DispatchConfig,
) -> (OrderDispatcher, Arc<SimulatedExchangeFactory>) {
    let registry = Arc::new(InMemoryAccountRegistry::new(accounts).unwrap());
    let factory = Arc::new(factory);
    let dispatcher = OrderDispatcher::new(registry, factory.clone(), &config);
    (dispatcher, factory)
}

fn dispatcher(
    accounts: Vec<Account>,
    factory: SimulatedExchangeFactory,
) -> (OrderDispatcher, Arc<SimulatedExchangeFactory>) {
    dispatcher_with(accounts, factory, DispatchConfig::default())
}

fn three_accounts() -> Vec<Account> {
    vec![
        Account::new("alice", "k1", "s1"),
        Account::new("bob", "k2", "s2"),
        Account::new("carol", "k3", "s3"),
    ]
}

fn placement(outcome: &AccountOutcome) -> &relay_core::OrderPlacement {
    match outcome.payload() {
        Some(OutcomePayload::OrderPlaced(placed)) => placed,
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_place_order_sizes_each_account_independently() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue())
        .with_venue("bob", venue().with_balance("USDT", dec!(2000)));
    let (dispatcher, factory) = dispatcher(
        vec![
            Account::new("alice", "k1", "s1"),
            Account::new("bob", "k2", "s2").with_leverage("BTCUSDT", 5),
        ],
        factory,
    );

    let envelope = dispatcher.place_order(intent()).await.unwrap();

    assert_eq!(envelope.action, DispatchAction::PlaceOrder);
    assert_eq!(envelope.total_count, 2);
    assert_eq!(envelope.success_count, 2);

    let alice = placement(envelope.outcome_for("alice").unwrap());
    assert_eq!(alice.leverage, 1);
    assert_eq!(alice.sizing.quantity, dec!(1));
    assert_eq!(alice.sizing.take_profit.to_string(), "102.0000");
    assert_eq!(alice.sizing.stop_loss.to_string(), "99.0000");
    assert_eq!(alice.sizing.notional.to_string(), "100.00");

    // 2000 * 5 * 10% / 100 = 10
    let bob = placement(envelope.outcome_for("bob").unwrap());
    assert_eq!(bob.leverage, 5);
    assert_eq!(bob.sizing.quantity, dec!(10));

    let orders = factory.venue("bob").unwrap().orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].take_profit, Some(dec!(102.0000)));
    assert!(!orders[0].reduce_only);
}

#[tokio::test]
async fn test_intent_leverage_applies_without_account_override() {
    let factory = SimulatedExchangeFactory::new().with_venue("alice", venue());
    let (dispatcher, _) = dispatcher(vec![Account::new("alice", "k1", "s1")], factory);

    let envelope = dispatcher
        .place_order(intent().with_leverage(3))
        .await
        .unwrap();

    let placed = placement(&envelope.outcomes[0]);
    assert_eq!(placed.leverage, 3);
    assert_eq!(placed.sizing.quantity, dec!(3));
}

#[tokio::test]
async fn test_failing_account_does_not_affect_others() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue())
        .with_venue(
            "bob",
            venue().with_fault(
                VenueStage::Price,
                ExchangeFault::Network("connection reset".to_string()),
            ),
        )
        .with_venue("carol", venue());
    let (dispatcher, factory) = dispatcher(three_accounts(), factory);

    let envelope = dispatcher.place_order(intent()).await.unwrap();

    assert_eq!(envelope.total_count, 3);
    assert_eq!(envelope.outcomes.len(), 3);
    assert_eq!(envelope.success_count, 2);
    assert_eq!(envelope.failed_accounts(), vec!["bob"]);

    match envelope.outcome_for("bob").unwrap() {
        AccountOutcome::Failure {
            error_kind,
            error_message,
            ..
        } => {
            assert_eq!(*error_kind, ErrorKind::Exchange);
            assert!(error_message.contains("get_price"));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    // bob은 가격 단계에서 멈추고 주문을 제출하지 않음
    let bob = factory.venue("bob").unwrap();
    assert_eq!(bob.call_count(VenueStage::Instrument).await, 0);
    assert!(bob.orders().await.is_empty());
    assert_eq!(factory.venue("carol").unwrap().orders().await.len(), 1);
}

#[tokio::test]
async fn test_instrument_fault_stops_only_that_account() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue())
        .with_venue(
            "bob",
            venue().with_fault(
                VenueStage::Instrument,
                ExchangeFault::MalformedResponse("empty instrument list".to_string()),
            ),
        )
        .with_venue("carol", venue());
    let (dispatcher, factory) = dispatcher(three_accounts(), factory);

    let envelope = dispatcher.place_order(intent()).await.unwrap();

    assert_eq!(envelope.success_count, 2);
    assert_eq!(envelope.failed_accounts(), vec!["bob"]);
    let bob = envelope.outcome_for("bob").unwrap();
    assert!(bob.error_message().unwrap().contains("get_instrument"));

    assert_eq!(factory.venue("bob").unwrap().call_count(VenueStage::PlaceOrder).await, 0);
    for bystander in ["alice", "carol"] {
        let placed = placement(envelope.outcome_for(bystander).unwrap());
        assert_eq!(placed.sizing.quantity, dec!(1));
        assert_eq!(factory.venue(bystander).unwrap().orders().await.len(), 1);
    }
}

#[tokio::test]
async fn test_submission_fault_stops_only_that_account() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue(
            "alice",
            venue().with_fault(
                VenueStage::PlaceOrder,
                ExchangeFault::Rejected("insufficient margin".to_string()),
            ),
        )
        .with_venue("bob", venue());
    let (dispatcher, factory) = dispatcher(
        vec![Account::new("alice", "k1", "s1"), Account::new("bob", "k2", "s2")],
        factory,
    );

    let envelope = dispatcher.place_order(intent()).await.unwrap();

    assert_eq!(envelope.success_count, 1);
    match envelope.outcome_for("alice").unwrap() {
        AccountOutcome::Failure {
            error_kind,
            error_message,
            ..
        } => {
            assert_eq!(*error_kind, ErrorKind::Exchange);
            assert!(error_message.contains("place_order"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(factory.venue("alice").unwrap().orders().await.is_empty());

    let bob = placement(envelope.outcome_for("bob").unwrap());
    assert_eq!(bob.sizing.quantity, dec!(1));
    let orders = factory.venue("bob").unwrap().orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].quantity, dec!(1));
}

#[tokio::test]
async fn test_out_of_range_sizing_is_invalid_input() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue(
            "alice",
            SimulatedVenue::new()
                .with_balance("USDT", dec!(1000))
                .with_market("BTCUSDT", dec!(64000), InstrumentConstraints::new(1, 3)),
        );
    let (dispatcher, factory) = dispatcher(vec![Account::new("alice", "k1", "s1")], factory);

    let huge = rust_decimal::Decimal::from_scientific("1e28").unwrap();
    let envelope = dispatcher
        .place_order(TradingIntent::new("BTCUSDT", Side::Long, dec!(10), huge, dec!(1)))
        .await
        .unwrap();

    match &envelope.outcomes[0] {
        AccountOutcome::Failure { error_kind, .. } => {
            assert_eq!(*error_kind, ErrorKind::InvalidInput)
        }
        other => panic!("expected failure, got {:?}", other),
    }
    let venue = factory.venue("alice").unwrap();
    assert_eq!(venue.call_count(VenueStage::PlaceOrder).await, 0);
}

#[tokio::test]
async fn test_lowercase_symbol_is_normalized() {
    let factory = SimulatedExchangeFactory::new().with_venue("alice", venue());
    let (dispatcher, factory) = dispatcher(vec![Account::new("alice", "k1", "s1")], factory);

    let envelope = dispatcher
        .place_order(TradingIntent::new("btcusdt", Side::Long, dec!(10), dec!(2), dec!(1)))
        .await
        .unwrap();

    assert_eq!(envelope.success_count, 1);
    assert_eq!(factory.venue("alice").unwrap().orders().await[0].symbol, "BTCUSDT");

    let err = dispatcher
        .close_order(CloseRequest::new("BTC&X"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_missing_usdt_balance_fails_only_that_account() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue())
        .with_venue(
            "bob",
            SimulatedVenue::new()
                .with_balance("BTC", dec!(1))
                .with_market("BTCUSDT", dec!(100), InstrumentConstraints::new(4, 0)),
        );
    let (dispatcher, _) = dispatcher(
        vec![Account::new("alice", "k1", "s1"), Account::new("bob", "k2", "s2")],
        factory,
    );

    let envelope = dispatcher.get_balances().await.unwrap();

    assert_eq!(envelope.success_count, 1);
    let bob = envelope.outcome_for("bob").unwrap();
    assert!(bob.error_message().unwrap().contains("USDT"));
}

#[tokio::test]
async fn test_zero_quantity_is_rejected_before_submission() {
    let factory =
        SimulatedExchangeFactory::new().with_venue("alice", venue().with_balance("USDT", dec!(5)));
    let (dispatcher, factory) = dispatcher(vec![Account::new("alice", "k1", "s1")], factory);

    let envelope = dispatcher.place_order(intent()).await.unwrap();

    match &envelope.outcomes[0] {
        AccountOutcome::Failure { error_kind, .. } => {
            assert_eq!(*error_kind, ErrorKind::InvalidInput)
        }
        other => panic!("expected failure, got {:?}", other),
    }
    let venue = factory.venue("alice").unwrap();
    assert_eq!(venue.call_count(VenueStage::PlaceOrder).await, 0);
}

#[tokio::test]
async fn test_invalid_intent_is_rejected_before_dispatch() {
    let factory = SimulatedExchangeFactory::new().with_venue("alice", venue());
    let (dispatcher, factory) = dispatcher(vec![Account::new("alice", "k1", "s1")], factory);

    let bad = TradingIntent::new("BTCUSDT", Side::Long, dec!(0), dec!(2), dec!(1));
    let err = dispatcher.place_order(bad).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let venue = factory.venue("alice").unwrap();
    assert_eq!(venue.call_count(VenueStage::Balance).await, 0);
}

#[tokio::test]
async fn test_inactive_accounts_skipped_for_mutations_only() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue())
        .with_venue("bob", venue())
        .with_venue("carol", venue());
    let mut accounts = three_accounts();
    accounts[1] = accounts[1].clone().with_active(false);
    let (dispatcher, factory) = dispatcher(accounts, factory);

    let placed = dispatcher.place_order(intent()).await.unwrap();
    assert_eq!(placed.total_count, 3);
    assert_eq!(placed.outcomes.len(), 2);
    assert!(placed.outcome_for("bob").is_none());
    assert!(factory.venue("bob").unwrap().orders().await.is_empty());

    let balances = dispatcher.get_balances().await.unwrap();
    assert_eq!(balances.total_count, 3);
    assert_eq!(balances.outcomes.len(), 3);
    match balances.outcome_for("bob").unwrap().payload() {
        Some(OutcomePayload::Balance(snapshot)) => assert!(!snapshot.active),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_account_fails_at_connect() {
    let factory = SimulatedExchangeFactory::new().with_venue("alice", venue());
    let (dispatcher, _) = dispatcher(
        vec![Account::new("alice", "k1", "s1"), Account::new("ghost", "k", "s")],
        factory,
    );

    let envelope = dispatcher.get_balances().await.unwrap();

    assert_eq!(envelope.success_count, 1);
    let ghost = envelope.outcome_for("ghost").unwrap();
    assert!(ghost.error_message().unwrap().contains("connect"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_account_times_out_without_blocking_others() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue())
        .with_venue("bob", venue().with_latency(Duration::from_secs(60)));
    let config = DispatchConfig {
        account_timeout_ms: 1_000,
        ..DispatchConfig::default()
    };
    let (dispatcher, _) = dispatcher_with(
        vec![Account::new("alice", "k1", "s1"), Account::new("bob", "k2", "s2")],
        factory,
        config,
    );

    let envelope = dispatcher.get_balances().await.unwrap();

    assert_eq!(envelope.success_count, 1);
    assert!(envelope.outcome_for("alice").unwrap().is_success());
    // 완료 순서: 빠른 계좌가 먼저
    assert_eq!(envelope.outcomes[0].account_id(), "alice");
    let bob = envelope.outcome_for("bob").unwrap();
    assert!(bob.error_message().unwrap().contains("Timeout"));
}

#[tokio::test]
async fn test_envelope_counts_are_consistent() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue())
        .with_venue(
            "bob",
            venue().with_fault(
                VenueStage::Balance,
                ExchangeFault::Unauthorized("invalid key".to_string()),
            ),
        )
        .with_venue("carol", venue());
    let (dispatcher, _) = dispatcher(three_accounts(), factory);

    let envelope = dispatcher.get_balances().await.unwrap();

    let successes = envelope.outcomes.iter().filter(|o| o.is_success()).count();
    assert_eq!(envelope.success_count, successes);
    assert_eq!(envelope.failure_count(), envelope.outcomes.len() - successes);
    assert!(envelope.outcomes.len() <= envelope.total_count);

    let mut ids: Vec<_> = envelope.outcomes.iter().map(|o| o.account_id()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["alice", "bob", "carol"]);
}

#[tokio::test]
async fn test_reads_are_idempotent() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue().with_position(btc_long(dec!(2))));
    let (dispatcher, _) = dispatcher(vec![Account::new("alice", "k1", "s1")], factory);

    let first = dispatcher.get_positions(PositionQuery::default()).await.unwrap();
    let second = dispatcher.get_positions(PositionQuery::default()).await.unwrap();

    assert_eq!(first.outcomes, second.outcomes);
    match first.outcomes[0].payload() {
        Some(OutcomePayload::Positions(snapshot)) => {
            assert_eq!(snapshot.positions["BTCUSDT"].size, dec!(2));
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_no_positions_is_empty_success() {
    let factory = SimulatedExchangeFactory::new().with_venue("alice", venue());
    let (dispatcher, _) = dispatcher(vec![Account::new("alice", "k1", "s1")], factory);

    let envelope = dispatcher.get_positions(PositionQuery::default()).await.unwrap();

    match envelope.outcomes[0].payload() {
        Some(OutcomePayload::Positions(snapshot)) => assert!(snapshot.positions.is_empty()),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_close_order_reduces_open_position() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue().with_position(btc_long(dec!(2))))
        .with_venue("bob", venue());
    let (dispatcher, factory) = dispatcher(
        vec![Account::new("alice", "k1", "s1"), Account::new("bob", "k2", "s2")],
        factory,
    );

    let envelope = dispatcher.close_order(CloseRequest::new("BTCUSDT")).await.unwrap();

    assert!(envelope.outcome_for("alice").unwrap().is_success());
    assert!(factory.venue("alice").unwrap().position("BTCUSDT").await.is_none());

    let orders = factory.venue("alice").unwrap().orders().await;
    assert_eq!(orders[0].side, Side::Short);
    assert!(orders[0].reduce_only);

    match envelope.outcome_for("bob").unwrap() {
        AccountOutcome::Failure { error_kind, .. } => {
            assert_eq!(*error_kind, ErrorKind::NotFound)
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_leverage_not_modified_is_success() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue().with_leverage("BTCUSDT", 5))
        .with_venue("bob", venue());
    let (dispatcher, factory) = dispatcher(
        vec![Account::new("alice", "k1", "s1"), Account::new("bob", "k2", "s2")],
        factory,
    );

    let envelope = dispatcher
        .set_leverage(LeverageRequest::new("BTCUSDT", 5))
        .await
        .unwrap();

    assert_eq!(envelope.success_count, 2);
    match envelope.outcome_for("alice").unwrap().payload() {
        Some(OutcomePayload::Leverage(change)) => assert!(!change.changed),
        other => panic!("unexpected payload: {:?}", other),
    }
    match envelope.outcome_for("bob").unwrap().payload() {
        Some(OutcomePayload::Leverage(change)) => assert!(change.changed),
        other => panic!("unexpected payload: {:?}", other),
    }
    assert_eq!(factory.venue("bob").unwrap().leverage("BTCUSDT").await, Some(5));
}

#[tokio::test]
async fn test_adjust_tp_sl_requires_open_position() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue().with_position(btc_long(dec!(1))))
        .with_venue("bob", venue());
    let (dispatcher, factory) = dispatcher(
        vec![Account::new("alice", "k1", "s1"), Account::new("bob", "k2", "s2")],
        factory,
    );

    let request = TradingStopRequest::new("BTCUSDT", Some(dec!(105.123456)), Some(dec!(95)));
    let envelope = dispatcher.adjust_tp_sl(request).await.unwrap();

    match envelope.outcome_for("alice").unwrap().payload() {
        Some(OutcomePayload::TradingStop(change)) => {
            assert_eq!(change.take_profit.unwrap().to_string(), "105.1235");
            assert_eq!(change.stop_loss.unwrap().to_string(), "95.0000");
            assert!(change.changed);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
    let position = factory.venue("alice").unwrap().position("BTCUSDT").await.unwrap();
    assert_eq!(position.take_profit, Some(dec!(105.1235)));

    match envelope.outcome_for("bob").unwrap() {
        AccountOutcome::Failure { error_kind, .. } => {
            assert_eq!(*error_kind, ErrorKind::NotFound)
        }
        other => panic!("expected failure, got {:?}", other),
    }
    let bob = factory.venue("bob").unwrap();
    assert_eq!(bob.call_count(VenueStage::TradingStop).await, 0);
}

#[tokio::test]
async fn test_position_mode_switch_to_one_way() {
    let factory = SimulatedExchangeFactory::new()
        .with_venue("alice", venue().with_position_mode(PositionMode::Hedge))
        .with_venue("bob", venue());
    let (dispatcher, factory) = dispatcher(
        vec![Account::new("alice", "k1", "s1"), Account::new("bob", "k2", "s2")],
        factory,
    );

    let request = PositionModeRequest::new(PositionMode::OneWay);
    let envelope = dispatcher.switch_position_mode(request.clone()).await.unwrap();
    assert_eq!(envelope.success_count, 2);
    assert_eq!(
        factory.venue("alice").unwrap().position_mode().await,
        PositionMode::OneWay
    );
    match envelope.outcome_for("alice").unwrap().payload() {
        Some(OutcomePayload::PositionMode(change)) => assert!(change.changed),
        other => panic!("unexpected payload: {:?}", other),
    }

    // 이미 원웨이인 계좌는 변경 없음으로 성공
    let again = dispatcher.switch_position_mode(request).await.unwrap();
    match again.outcome_for("bob").unwrap().payload() {
        Some(OutcomePayload::PositionMode(change)) => assert!(!change.changed),
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_hedge_mode_is_rejected_before_dispatch() {
    let factory = SimulatedExchangeFactory::new().with_venue("alice", venue());
    let (dispatcher, factory) = dispatcher(vec![Account::new("alice", "k1", "s1")], factory);

    let err = dispatcher
        .switch_position_mode(PositionModeRequest::new(PositionMode::Hedge))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let venue = factory.venue("alice").unwrap();
    assert_eq!(venue.call_count(VenueStage::PositionMode).await, 0);
    assert_eq!(venue.position_mode().await, PositionMode::OneWay);
}

#[tokio::test(start_paused = true)]
async fn test_read_retry_recovers_from_transient_fault() {
    let factory = SimulatedExchangeFactory::new().with_venue(
        "alice",
        venue().with_fault(
            VenueStage::Balance,
            ExchangeFault::Network("connection reset".to_string()),
        ),
    );
    let config = DispatchConfig {
        read_retries: 3,
        ..DispatchConfig::default()
    };
    let (dispatcher, factory) =
        dispatcher_with(vec![Account::new("alice", "k1", "s1")], factory, config);
    let venue = factory.venue("alice").unwrap();

    let clear = {
        let venue = venue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            venue.clear_fault(VenueStage::Balance).await;
        })
    };

    let envelope = dispatcher.get_balances().await.unwrap();
    clear.await.unwrap();

    assert_eq!(envelope.success_count, 1);
    assert!(venue.call_count(VenueStage::Balance).await >= 2);
}

#[tokio::test]
async fn test_mutations_are_never_retried() {
    let factory = SimulatedExchangeFactory::new().with_venue(
        "alice",
        venue().with_fault(
            VenueStage::PlaceOrder,
            ExchangeFault::Network("connection reset".to_string()),
        ),
    );
    let config = DispatchConfig {
        read_retries: 3,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 1,
        ..DispatchConfig::default()
    };
    let (dispatcher, factory) =
        dispatcher_with(vec![Account::new("alice", "k1", "s1")], factory, config);

    let envelope = dispatcher.place_order(intent()).await.unwrap();

    assert_eq!(envelope.success_count, 0);
    let venue = factory.venue("alice").unwrap();
    assert_eq!(venue.call_count(VenueStage::PlaceOrder).await, 1);
}

#[tokio::test]
async fn test_empty_registry_yields_empty_envelope() {
    let (dispatcher, _) = dispatcher(Vec::new(), SimulatedExchangeFactory::new());

    let envelope = dispatcher.get_balances().await.unwrap();

    assert_eq!(envelope.total_count, 0);
    assert!(envelope.outcomes.is_empty());
}
