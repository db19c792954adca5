//! Shared types for the trading assistant.
//!
//! These types form the per-cycle data model. Nothing here is persisted:
//! every value is rebuilt from fresh broker / market-data reads each cycle
//! and dropped when the cycle ends.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Broker account balances, fetched fresh every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub equity: Decimal,
    pub buying_power: Decimal,
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "equity ${:.2} | buying power ${:.2}", self.equity, self.buying_power)
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// A single `(timestamp, value)` point from the provider's history series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

/// One OHLC candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} O:{} H:{} L:{} C:{}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.open,
            self.high,
            self.low,
            self.close,
        )
    }
}

/// Historical series as returned by the provider's chart endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketChart {
    pub prices: Vec<PricePoint>,
    pub market_caps: Vec<PricePoint>,
    pub total_volumes: Vec<PricePoint>,
}

/// Everything the signal and execution stages know about the market.
///
/// `historical_prices` is kept in provider order, which is assumed to be
/// chronological. `sma7` / `sma50` are only present when at least 7 / 50
/// points exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub current_price: Option<Decimal>,
    pub historical_prices: Vec<PricePoint>,
    pub market_caps: Vec<PricePoint>,
    pub total_volumes: Vec<PricePoint>,
    pub ohlc: Vec<Candle>,
    pub sma7: Option<Decimal>,
    pub sma50: Option<Decimal>,
}

impl IndicatorSnapshot {
    /// Last `n` candles (fewer if not enough exist).
    pub fn recent_candles(&self, n: usize) -> &[Candle] {
        let start = self.ohlc.len().saturating_sub(n);
        &self.ohlc[start..]
    }

    /// Last `n` historical price points (fewer if not enough exist).
    pub fn recent_prices(&self, n: usize) -> &[PricePoint] {
        let start = self.historical_prices.len().saturating_sub(n);
        &self.historical_prices[start..]
    }
}

// ---------------------------------------------------------------------------
// Signal & intent
// ---------------------------------------------------------------------------

/// Discrete trading action. Closed set; anything unrecognised is `Hold`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSignal {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl TradeSignal {
    pub const ALL: &'static [TradeSignal] = &[TradeSignal::Buy, TradeSignal::Sell, TradeSignal::Hold];

    /// Map a single token to a signal. Unknown tokens are `None`, callers
    /// decide the fallback.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "BUY" => Some(TradeSignal::Buy),
            "SELL" => Some(TradeSignal::Sell),
            "HOLD" => Some(TradeSignal::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSignal::Buy => write!(f, "BUY"),
            TradeSignal::Sell => write!(f, "SELL"),
            TradeSignal::Hold => write!(f, "HOLD"),
        }
    }
}

/// What the executor intends to do with a signal once sizing is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderIntent {
    /// Market buy for a USD notional amount. `client_order_id` is fixed
    /// when the intent is planned so every retry resubmits the same order.
    Buy {
        symbol: String,
        notional: Decimal,
        client_order_id: String,
    },
    /// Flatten the entire position in `symbol`.
    Sell { symbol: String },
    Hold,
}

// ---------------------------------------------------------------------------
// Broker types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good-til-cancelled. Required for crypto orders.
    Gtc,
}

/// A notional-sized order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub notional: Decimal,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    /// Idempotency key. The broker rejects a second order with the same id.
    pub client_order_id: String,
}

impl OrderRequest {
    /// Market buy sized by USD notional, good-til-cancelled.
    pub fn market_buy(symbol: &str, notional: Decimal, client_order_id: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            notional,
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Gtc,
            client_order_id: client_order_id.to_string(),
        }
    }
}

/// Fresh idempotency key for one planned order.
pub fn new_client_order_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Broker acknowledgement of a submitted order or closed position.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    /// Closing a long position comes back as a `Sell` order.
    pub side: Option<OrderSide>,
    pub status: String,
    pub submitted_at: DateTime<Utc>,
}

/// Open position as reported by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub qty: Decimal,
    pub market_value: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded fixed-delay retry budget.
///
/// `max_retries` counts retries, not attempts: a policy of 3 allows one
/// initial attempt plus up to 3 more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Market-data failures. Not retried by the aggregator; the cycle decides.
#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("Market data unavailable ({endpoint}): {message}")]
    Unavailable { endpoint: String, message: String },

    #[error("Failed to decode market data ({endpoint}): {message}")]
    Decode { endpoint: String, message: String },
}

/// Text-generation failures.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Provider temporarily unavailable (HTTP 503). The only retryable class.
    #[error("Model service unavailable: {0}")]
    Unavailable(String),

    #[error("Model API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Model request failed: {0}")]
    Transport(String),

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Failed to decode model response: {0}")]
    Decode(String),
}

impl ModelError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ModelError::Unavailable(_))
    }
}

/// Broker failures. `NotFound` is kept distinct so "no position" can be
/// treated as a successful no-op.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Broker API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Broker request failed: {0}")]
    Transport(String),

    #[error("Failed to decode broker response: {0}")]
    Decode(String),
}

/// Status codes that repeating the same request cannot fix.
const NON_RETRYABLE_STATUSES: &[u16] = &[401, 403, 422];

impl BrokerError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BrokerError::NotFound(_) => Some(404),
            BrokerError::Api { status, .. } => Some(*status),
            BrokerError::Transport(_) | BrokerError::Decode(_) => None,
        }
    }

    /// Whether the executor should spend retry budget on this error.
    pub fn is_retryable(&self) -> bool {
        match self.status() {
            Some(code) => !NON_RETRYABLE_STATUSES.contains(&code),
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
