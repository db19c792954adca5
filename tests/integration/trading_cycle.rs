//! Full-cycle tests through the public API.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use crypto_assistant::broker::Broker;
use crypto_assistant::data::indicators::IndicatorAggregator;
use crypto_assistant::engine::{
    CycleOrchestrator, ExecutionOutcome, ExecutorConfig, MarketTarget, SkipReason, TradeExecutor,
};
use crypto_assistant::strategy::prompt::AssetLabel;
use crypto_assistant::strategy::SignalExtractor;
use crypto_assistant::types::{OrderSide, RetryPolicy, TimeInForce, TradeSignal};

use crate::mock_services::{MockBroker, MockMarketData, ScriptedModel};

const NO_DELAY: RetryPolicy = RetryPolicy {
    max_retries: 3,
    delay: Duration::ZERO,
};

struct Harness {
    broker: Arc<MockBroker>,
    data: Arc<MockMarketData>,
    model: Arc<ScriptedModel>,
    orchestrator: CycleOrchestrator,
}

fn harness(broker: MockBroker, data: MockMarketData, model: ScriptedModel) -> Harness {
    let broker = Arc::new(broker);
    let data = Arc::new(data);
    let model = Arc::new(model);

    let broker_dyn: Arc<dyn Broker> = broker.clone();
    let orchestrator = CycleOrchestrator::new(
        broker_dyn.clone(),
        IndicatorAggregator::new(data.clone()),
        SignalExtractor::new(model.clone(), AssetLabel::default()).with_retry_policy(NO_DELAY),
        TradeExecutor::new(
            broker_dyn,
            ExecutorConfig {
                retry: NO_DELAY,
                ..ExecutorConfig::default()
            },
        ),
        MarketTarget::default(),
    );

    Harness {
        broker,
        data,
        model,
        orchestrator,
    }
}

/// 60 rising daily closes: 60000, 60100, ... 65900.
fn uptrend() -> MockMarketData {
    MockMarketData::trending(Some(dec!(66000)), dec!(60000), dec!(100), 60)
}

// ---------------------------------------------------------------------------
// BUY
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_buy_cycle_places_ninety_percent_notional() {
    let h = harness(
        MockBroker::new(dec!(10000), dec!(1000)),
        uptrend(),
        ScriptedModel::replying("BUY. Price is above both moving averages."),
    );

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert_eq!(report.signal, TradeSignal::Buy);
    assert!(matches!(report.outcome, ExecutionOutcome::Bought { notional, .. } if notional == dec!(900)));

    let orders = h.broker.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].symbol, "BTC/USD");
    assert_eq!(orders[0].notional, dec!(900));
    assert_eq!(orders[0].side, OrderSide::Buy);
    assert_eq!(orders[0].time_in_force, TimeInForce::Gtc);
    assert_eq!(h.broker.call_count("get_position"), 0);
}

#[tokio::test]
async fn test_prompt_carries_account_and_indicators() {
    let h = harness(
        MockBroker::new(dec!(12500.50), dec!(3000)),
        uptrend(),
        ScriptedModel::replying("HOLD"),
    );

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");
    assert_eq!(report.outcome, ExecutionOutcome::Held);

    let prompts = h.model.prompts();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert!(prompt.contains("Total Portfolio Value (USD): 12500.50"));
    assert!(prompt.contains("Available Buying Power (USD): 3000"));
    assert!(prompt.contains("Current Price: 66000"));
    // mean of the last 7 closes: 65300..=65900
    assert!(prompt.contains("(SMA7): 65600"));
    // mean of the last 50 closes: 61000..=65900
    assert!(prompt.contains("(SMA50): 63450"));
    assert!(prompt.contains("golden-cross"));
}

#[tokio::test]
async fn test_buy_with_tiny_balance_places_nothing() {
    let h = harness(
        MockBroker::new(dec!(1), dec!(1)),
        uptrend(),
        ScriptedModel::replying("BUY"),
    );

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert_eq!(
        report.outcome,
        ExecutionOutcome::Skipped(SkipReason::BelowMinimumNotional(dec!(0.9)))
    );
    assert!(h.broker.orders().is_empty());
    assert_eq!(h.broker.call_count("create_order"), 0);
}

#[tokio::test]
async fn test_buy_without_spot_price_is_skipped() {
    let h = harness(
        MockBroker::new(dec!(5000), dec!(5000)),
        MockMarketData::trending(None, dec!(100), dec!(1), 60),
        ScriptedModel::replying("BUY"),
    );

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert_eq!(report.current_price, None);
    assert_eq!(report.outcome, ExecutionOutcome::Skipped(SkipReason::MissingPrice));
    assert_eq!(h.broker.call_count("create_order"), 0);
}

#[tokio::test]
async fn test_validation_error_is_not_retried() {
    let broker = MockBroker::new(dec!(1000), dec!(1000));
    broker.fail_orders(422, 10);
    let h = harness(broker, uptrend(), ScriptedModel::replying("BUY"));

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert!(matches!(report.outcome, ExecutionOutcome::Aborted { status: Some(422), .. }));
    assert_eq!(h.broker.call_count("create_order"), 1);
}

#[tokio::test]
async fn test_server_errors_retry_then_succeed() {
    let broker = MockBroker::new(dec!(1000), dec!(1000));
    broker.fail_orders(500, 2);
    let h = harness(broker, uptrend(), ScriptedModel::replying("BUY"));

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert!(report.outcome.is_order_placed());
    assert_eq!(h.broker.call_count("create_order"), 3);
    assert_eq!(h.broker.orders().len(), 1);

    // every resubmission carries the original idempotency key
    let ids = h.broker.submitted_ids();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id == &ids[0]));
    assert_eq!(h.broker.orders()[0].client_order_id, ids[0]);
}

#[tokio::test]
async fn test_server_errors_exhaust_retry_budget() {
    let broker = MockBroker::new(dec!(1000), dec!(1000));
    broker.fail_orders(500, 10);
    let h = harness(broker, uptrend(), ScriptedModel::replying("BUY"));

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert!(matches!(report.outcome, ExecutionOutcome::Exhausted { attempts: 4, .. }));
    assert_eq!(h.broker.call_count("create_order"), 4);
    assert!(h.broker.orders().is_empty());
}

// ---------------------------------------------------------------------------
// SELL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sell_closes_open_position() {
    let h = harness(
        MockBroker::new(dec!(2000), dec!(0)).with_position(dec!(0.03)),
        uptrend(),
        ScriptedModel::replying("SELL - momentum is fading"),
    );

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert!(matches!(report.outcome, ExecutionOutcome::Closed { qty, .. } if qty == dec!(0.03)));
    assert_eq!(h.broker.closes(), vec!["BTC/USD".to_string()]);
    assert_eq!(h.broker.position(), None);
    assert!(h.broker.orders().is_empty());
}

#[tokio::test]
async fn test_sell_without_position_is_noop() {
    let h = harness(
        MockBroker::new(dec!(1000), dec!(1000)),
        uptrend(),
        ScriptedModel::replying("SELL"),
    );

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert_eq!(report.outcome, ExecutionOutcome::NoPosition);
    assert_eq!(h.broker.call_count("get_position"), 1);
    assert_eq!(h.broker.call_count("close_position"), 0);
    assert_eq!(h.broker.call_count("create_order"), 0);
}

// ---------------------------------------------------------------------------
// Failures before execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_account_failure_skips_everything_else() {
    let broker = MockBroker::new(dec!(1000), dec!(1000));
    broker.fail_account("connection refused");
    let h = harness(broker, uptrend(), ScriptedModel::replying("BUY"));

    assert!(h.orchestrator.run_cycle().await.is_none());
    assert!(h.data.calls().is_empty());
    assert!(h.model.prompts().is_empty());
    assert_eq!(h.broker.calls(), vec!["get_account".to_string()]);
}

#[tokio::test]
async fn test_market_data_outage_skips_signal_and_trade() {
    let h = harness(
        MockBroker::new(dec!(1000), dec!(1000)),
        MockMarketData::unavailable(),
        ScriptedModel::replying("BUY"),
    );

    assert!(h.orchestrator.run_cycle().await.is_none());
    assert!(h.model.prompts().is_empty());
    assert_eq!(h.broker.call_count("create_order"), 0);
}

// ---------------------------------------------------------------------------
// Model behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_model_outage_resolves_to_hold() {
    let h = harness(
        MockBroker::new(dec!(1000), dec!(1000)),
        uptrend(),
        ScriptedModel::new(vec![Err(503)]),
    );

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert_eq!(report.signal, TradeSignal::Hold);
    assert_eq!(report.outcome, ExecutionOutcome::Held);
    // one initial request + 3 retries
    assert_eq!(h.model.prompts().len(), 4);
    assert!(h.broker.orders().is_empty());
}

#[tokio::test]
async fn test_model_recovers_after_transient_outage() {
    let h = harness(
        MockBroker::new(dec!(1000), dec!(1000)),
        uptrend(),
        ScriptedModel::new(vec![Err(503), Ok("I recommend we BUY aggressively because...")]),
    );

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert_eq!(report.signal, TradeSignal::Buy);
    assert_eq!(h.model.prompts().len(), 2);
    assert_eq!(h.broker.orders().len(), 1);
}

#[tokio::test]
async fn test_unrecognised_reply_holds() {
    let h = harness(
        MockBroker::new(dec!(1000), dec!(1000)).with_position(dec!(1)),
        uptrend(),
        ScriptedModel::replying("HOLDING is wise here."),
    );

    let report = h.orchestrator.run_cycle().await.expect("cycle completes");

    assert_eq!(report.signal, TradeSignal::Hold);
    assert_eq!(report.outcome, ExecutionOutcome::Held);
    assert_eq!(h.broker.position(), Some(Decimal::ONE));
}

#[tokio::test]
async fn test_consecutive_cycles_are_independent() {
    let h = harness(
        MockBroker::new(dec!(1000), dec!(1000)),
        uptrend(),
        ScriptedModel::new(vec![Ok("BUY"), Ok("BUY")]),
    );

    let first = h.orchestrator.run_cycle().await.expect("first cycle");
    let second = h.orchestrator.run_cycle().await.expect("second cycle");

    assert!(matches!(first.outcome, ExecutionOutcome::Bought { notional, .. } if notional == dec!(900)));
    // buying power is now 100; 90% of it
    assert!(matches!(second.outcome, ExecutionOutcome::Bought { notional, .. } if notional == dec!(90)));
    let orders = h.broker.orders();
    assert_eq!(orders.len(), 2);
    assert_ne!(orders[0].client_order_id, orders[1].client_order_id);
}
