//! Cycle orchestrator.
//!
//! One cycle: account → indicators → signal → trade. Cycles are
//! self-contained and never raise; a failure before execution is logged
//! and the cycle ends early so the next tick can run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::executor::{ExecutionOutcome, TradeExecutor};
use crate::broker::Broker;
use crate::data::indicators::IndicatorAggregator;
use crate::strategy::SignalExtractor;
use crate::types::{AccountState, TradeSignal};

/// Which market the cycle reads indicators for.
#[derive(Debug, Clone)]
pub struct MarketTarget {
    pub asset_id: String,
    pub quote_currency: String,
    pub history_days: u32,
    pub interval: String,
}

impl Default for MarketTarget {
    fn default() -> Self {
        Self {
            asset_id: "bitcoin".to_string(),
            quote_currency: "usd".to_string(),
            history_days: 60,
            interval: "daily".to_string(),
        }
    }
}

/// What happened in one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub account: AccountState,
    pub current_price: Option<Decimal>,
    pub signal: TradeSignal,
    pub outcome: ExecutionOutcome,
}

pub struct CycleOrchestrator {
    broker: Arc<dyn Broker>,
    aggregator: IndicatorAggregator,
    signals: SignalExtractor,
    executor: TradeExecutor,
    target: MarketTarget,
}

impl CycleOrchestrator {
    pub fn new(
        broker: Arc<dyn Broker>,
        aggregator: IndicatorAggregator,
        signals: SignalExtractor,
        executor: TradeExecutor,
        target: MarketTarget,
    ) -> Self {
        Self {
            broker,
            aggregator,
            signals,
            executor,
            target,
        }
    }

    /// Run one trading cycle. Returns `None` when the cycle ended early.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        info!("Starting trading cycle");
        match self.try_run_cycle().await {
            Ok(report) => {
                log_cycle_report(&report);
                Some(report)
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Trading cycle aborted");
                None
            }
        }
    }

    async fn try_run_cycle(&self) -> Result<CycleReport> {
        let started_at = Utc::now();

        // 1. Account
        info!("Fetching account balance");
        let account = self
            .broker
            .get_account()
            .await
            .context("Failed to fetch account balance")?;
        info!(
            equity = %account.equity,
            buying_power = %account.buying_power,
            "Account fetched"
        );

        // 2. Indicators
        let indicators = self
            .aggregator
            .fetch_indicators(
                &self.target.asset_id,
                &self.target.quote_currency,
                self.target.history_days,
                &self.target.interval,
            )
            .await
            .context("Failed to fetch market indicators")?;
        if indicators.current_price.is_none() {
            warn!("Cycle continuing without a current price");
        }

        // 3. Signal
        let signal = self
            .signals
            .extract_signal(account.equity, account.buying_power, &indicators)
            .await;

        // 4. Trade
        let outcome = self
            .executor
            .execute_trade(signal, account.buying_power, &indicators)
            .await;

        Ok(CycleReport {
            started_at,
            finished_at: Utc::now(),
            current_price: indicators.current_price,
            account,
            signal,
            outcome,
        })
    }
}

fn log_cycle_report(report: &CycleReport) {
    let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();
    if report.outcome.is_failure() {
        warn!(
            signal = %report.signal,
            outcome = %report.outcome,
            elapsed_ms,
            "Cycle complete with failed execution"
        );
    } else {
        info!(
            signal = %report.signal,
            outcome = %report.outcome,
            price = ?report.current_price,
            equity = %report.account.equity,
            elapsed_ms,
            "Cycle complete"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
