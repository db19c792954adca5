//! Trade executor.
//!
//! Turns a `TradeSignal` into broker calls: a notional market buy sized
//! from buying power, or a full liquidation of the open position. Broker
//! failures are retried with a fixed delay up to the configured budget;
//! auth/validation failures abort at once. Nothing is ever raised to the
//! caller: every path ends in an `ExecutionOutcome`.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::broker::Broker;
use crate::types::{
    new_client_order_id, BrokerError, IndicatorSnapshot, OrderIntent, OrderReceipt, OrderRequest,
    RetryPolicy, TradeSignal,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_SYMBOL: &str = "BTC/USD";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Share of buying power committed to a BUY; the rest absorbs slippage and fees.
pub const DEFAULT_BUY_FRACTION: Decimal = dec!(0.9);
/// Broker minimum order size in USD. Orders must be strictly larger.
pub const DEFAULT_MIN_NOTIONAL: Decimal = dec!(1);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub symbol: String,
    pub buy_fraction: Decimal,
    pub min_notional: Decimal,
    pub retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            buy_fraction: DEFAULT_BUY_FRACTION,
            min_notional: DEFAULT_MIN_NOTIONAL,
            retry: RetryPolicy::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a signal was not acted on before any broker call.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// BUY without a current price.
    MissingPrice,
    /// BUY with zero or negative buying power.
    InvalidBuyingPower(Decimal),
    /// Sized notional did not clear the minimum order size.
    BelowMinimumNotional(Decimal),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingPrice => write!(f, "current price not available"),
            SkipReason::InvalidBuyingPower(bp) => write!(f, "invalid buying power {bp}"),
            SkipReason::BelowMinimumNotional(n) => write!(f, "notional ${n} below minimum"),
        }
    }
}

/// Terminal state of one `execute_trade` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Bought { notional: Decimal, receipt: OrderReceipt },
    Closed { qty: Decimal, receipt: OrderReceipt },
    /// SELL with nothing to sell.
    NoPosition,
    Held,
    Skipped(SkipReason),
    /// Non-retryable broker error; no further attempts were made.
    Aborted { status: Option<u16>, message: String },
    /// Retry budget spent without success.
    Exhausted { attempts: u32, last_error: String },
}

impl ExecutionOutcome {
    /// Whether an order reached the broker successfully.
    pub fn is_order_placed(&self) -> bool {
        matches!(self, ExecutionOutcome::Bought { .. } | ExecutionOutcome::Closed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::Aborted { .. } | ExecutionOutcome::Exhausted { .. }
        )
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Bought { notional, receipt } => {
                write!(f, "bought ${notional} (order {})", receipt.order_id)
            }
            ExecutionOutcome::Closed { qty, receipt } => {
                write!(f, "closed {qty} (order {})", receipt.order_id)
            }
            ExecutionOutcome::NoPosition => write!(f, "no position to sell"),
            ExecutionOutcome::Held => write!(f, "held"),
            ExecutionOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            ExecutionOutcome::Aborted { status, message } => match status {
                Some(code) => write!(f, "aborted ({code}): {message}"),
                None => write!(f, "aborted: {message}"),
            },
            ExecutionOutcome::Exhausted { attempts, last_error } => {
                write!(f, "failed after {attempts} attempts: {last_error}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct TradeExecutor {
    broker: Arc<dyn Broker>,
    config: ExecutorConfig,
}

impl TradeExecutor {
    pub fn new(broker: Arc<dyn Broker>, config: ExecutorConfig) -> Self {
        Self { broker, config }
    }

    /// USD notional for a BUY: `buying_power × buy_fraction`, truncated to cents.
    pub fn buy_notional(&self, buying_power: Decimal) -> Decimal {
        (buying_power * self.config.buy_fraction)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero)
    }

    /// Resolve a signal into an order intent, checking BUY preconditions.
    ///
    /// A BUY intent gets its client order id here, once, so a retry after a
    /// lost broker reply cannot place a second order.
    pub fn plan_order(
        &self,
        signal: TradeSignal,
        buying_power: Decimal,
        indicators: &IndicatorSnapshot,
    ) -> Result<OrderIntent, SkipReason> {
        match signal {
            TradeSignal::Hold => Ok(OrderIntent::Hold),
            TradeSignal::Sell => Ok(OrderIntent::Sell {
                symbol: self.config.symbol.clone(),
            }),
            TradeSignal::Buy => {
                if indicators.current_price.is_none() {
                    return Err(SkipReason::MissingPrice);
                }
                if buying_power <= Decimal::ZERO {
                    return Err(SkipReason::InvalidBuyingPower(buying_power));
                }
                let notional = self.buy_notional(buying_power);
                if notional <= self.config.min_notional {
                    return Err(SkipReason::BelowMinimumNotional(notional));
                }
                Ok(OrderIntent::Buy {
                    symbol: self.config.symbol.clone(),
                    notional,
                    client_order_id: new_client_order_id(),
                })
            }
        }
    }

    /// Act on `signal`. Always returns; failures are logged and reported
    /// through the outcome.
    pub async fn execute_trade(
        &self,
        signal: TradeSignal,
        buying_power: Decimal,
        indicators: &IndicatorSnapshot,
    ) -> ExecutionOutcome {
        info!(signal = %signal, "Executing trade");

        let intent = match self.plan_order(signal, buying_power, indicators) {
            Ok(intent) => intent,
            Err(SkipReason::BelowMinimumNotional(notional)) => {
                info!(notional = %notional, min = %self.config.min_notional, "Notional too small; not placing BUY");
                return ExecutionOutcome::Skipped(SkipReason::BelowMinimumNotional(notional));
            }
            Err(reason) => {
                error!(reason = %reason, "Cannot execute BUY order");
                return ExecutionOutcome::Skipped(reason);
            }
        };

        if intent == OrderIntent::Hold {
            info!("Holding position as recommended");
            return ExecutionOutcome::Held;
        }

        let retry = self.config.retry;
        let mut last_error = String::new();

        for attempt in 0..=retry.max_retries {
            if attempt > 0 {
                info!(attempt, max_retries = retry.max_retries, "Retrying trade execution");
                tokio::time::sleep(retry.delay).await;
            }

            match self.attempt(&intent).await {
                Ok(outcome) => return outcome,
                Err(e) => {
                    error!(attempt, status = ?e.status(), error = %e, "Error executing trade");
                    if !e.is_retryable() {
                        error!(status = ?e.status(), "Non-retryable broker error; aborting trade");
                        return ExecutionOutcome::Aborted {
                            status: e.status(),
                            message: e.to_string(),
                        };
                    }
                    last_error = e.to_string();
                }
            }
        }

        error!(
            attempts = retry.max_attempts(),
            "Max retries reached; trade execution failed permanently"
        );
        ExecutionOutcome::Exhausted {
            attempts: retry.max_attempts(),
            last_error,
        }
    }

    /// One pass at the intended action. SELL re-reads the position every
    /// time rather than trusting an earlier attempt.
    async fn attempt(&self, intent: &OrderIntent) -> Result<ExecutionOutcome, BrokerError> {
        match intent {
            OrderIntent::Hold => Ok(ExecutionOutcome::Held),
            OrderIntent::Buy {
                symbol,
                notional,
                client_order_id,
            } => {
                info!(
                    symbol = %symbol,
                    notional = %notional,
                    client_order_id = %client_order_id,
                    "Placing BUY order"
                );
                let receipt = self
                    .broker
                    .create_order(&OrderRequest::market_buy(symbol, *notional, client_order_id))
                    .await?;
                info!(
                    symbol = %symbol,
                    notional = %notional,
                    order_id = %receipt.order_id,
                    "Executed BUY order"
                );
                Ok(ExecutionOutcome::Bought {
                    notional: *notional,
                    receipt,
                })
            }
            OrderIntent::Sell { symbol } => {
                info!(symbol = %symbol, "SELL received; checking for existing position");
                let position = match self.broker.get_position(symbol).await {
                    Ok(position) => position,
                    Err(BrokerError::NotFound(_)) => {
                        info!(symbol = %symbol, "No existing position to sell");
                        return Ok(ExecutionOutcome::NoPosition);
                    }
                    Err(e) => return Err(e),
                };

                if position.qty <= Decimal::ZERO {
                    warn!(symbol = %symbol, qty = %position.qty, "Position has no quantity to sell");
                    return Ok(ExecutionOutcome::NoPosition);
                }

                info!(
                    symbol = %symbol,
                    qty = %position.qty,
                    market_value = ?position.market_value,
                    "Closing entire position"
                );
                let receipt = self.broker.close_position(symbol).await?;
                info!(symbol = %symbol, order_id = %receipt.order_id, "Executed SELL to close position");
                Ok(ExecutionOutcome::Closed {
                    qty: position.qty,
                    receipt,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
