//! Mock services for integration testing.
//!
//! Deterministic `Broker`, `MarketDataProvider` and `TextGenerator`
//! implementations that keep their state in memory and record every
//! call, so tests can assert on what a cycle actually did.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crypto_assistant::broker::Broker;
use crypto_assistant::data::MarketDataProvider;
use crypto_assistant::llm::TextGenerator;
use crypto_assistant::types::*;

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// In-memory brokerage account.
pub struct MockBroker {
    account: Arc<Mutex<AccountState>>,
    position: Arc<Mutex<Option<Decimal>>>,
    orders: Arc<Mutex<Vec<OrderRequest>>>,
    /// Client order id of every submission, including failed ones.
    submitted_ids: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
    /// Statuses returned by the next order submissions, in order.
    order_failures: Arc<Mutex<VecDeque<u16>>>,
    /// If set, `get_account` fails.
    account_error: Arc<Mutex<Option<String>>>,
}

impl MockBroker {
    pub fn new(equity: Decimal, buying_power: Decimal) -> Self {
        Self {
            account: Arc::new(Mutex::new(AccountState {
                equity,
                buying_power,
            })),
            position: Arc::new(Mutex::new(None)),
            orders: Arc::new(Mutex::new(Vec::new())),
            submitted_ids: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            order_failures: Arc::new(Mutex::new(VecDeque::new())),
            account_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_position(self, qty: Decimal) -> Self {
        *self.position.lock().unwrap() = Some(qty);
        self
    }

    /// Fail the next `n` order submissions with `status`.
    pub fn fail_orders(&self, status: u16, n: usize) {
        let mut failures = self.order_failures.lock().unwrap();
        failures.extend(std::iter::repeat(status).take(n));
    }

    pub fn fail_account(&self, msg: &str) {
        *self.account_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    pub fn submitted_ids(&self) -> Vec<String> {
        self.submitted_ids.lock().unwrap().clone()
    }

    pub fn closes(&self) -> Vec<String> {
        self.closes.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    pub fn position(&self) -> Option<Decimal> {
        *self.position.lock().unwrap()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn receipt(symbol: &str) -> OrderReceipt {
        OrderReceipt {
            order_id: Uuid::new_v4().to_string(),
            client_order_id: None,
            symbol: symbol.to_string(),
            side: None,
            status: "accepted".to_string(),
            submitted_at: Utc::now(),
        }
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn get_account(&self) -> Result<AccountState, BrokerError> {
        self.record("get_account");
        if let Some(msg) = self.account_error.lock().unwrap().clone() {
            return Err(BrokerError::Transport(msg));
        }
        Ok(self.account.lock().unwrap().clone())
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BrokerError> {
        self.record("create_order");
        self.submitted_ids
            .lock()
            .unwrap()
            .push(order.client_order_id.clone());
        if let Some(status) = self.order_failures.lock().unwrap().pop_front() {
            return Err(BrokerError::Api {
                status,
                message: format!("mock failure {status}"),
            });
        }

        self.orders.lock().unwrap().push(order.clone());
        let mut account = self.account.lock().unwrap();
        account.buying_power -= order.notional;
        Ok(Self::receipt(&order.symbol))
    }

    async fn get_position(&self, symbol: &str) -> Result<Position, BrokerError> {
        self.record("get_position");
        match *self.position.lock().unwrap() {
            Some(qty) => Ok(Position {
                symbol: symbol.replace('/', ""),
                qty,
                market_value: None,
            }),
            None => Err(BrokerError::NotFound("position does not exist".into())),
        }
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderReceipt, BrokerError> {
        self.record("close_position");
        let mut position = self.position.lock().unwrap();
        if position.take().is_none() {
            return Err(BrokerError::NotFound("position does not exist".into()));
        }
        self.closes.lock().unwrap().push(symbol.to_string());
        Ok(Self::receipt(symbol))
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Fixed market data: a linear daily price series plus hourly candles.
pub struct MockMarketData {
    spot: Option<Decimal>,
    prices: Vec<Decimal>,
    unavailable: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockMarketData {
    /// `days` daily closes starting at `start`, stepping by `step`.
    pub fn trending(spot: Option<Decimal>, start: Decimal, step: Decimal, days: usize) -> Self {
        let prices = (0..days)
            .map(|i| start + step * Decimal::from(i as u64))
            .collect();
        Self {
            spot,
            prices,
            unavailable: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            spot: None,
            prices: Vec::new(),
            unavailable: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, endpoint: &str) -> Result<(), MarketDataError> {
        self.calls.lock().unwrap().push(endpoint.to_string());
        if self.unavailable {
            return Err(MarketDataError::Unavailable {
                endpoint: endpoint.to_string(),
                message: "HTTP 429 Too Many Requests".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    async fn spot_price(
        &self,
        _asset_id: &str,
        _quote_currency: &str,
    ) -> Result<Option<Decimal>, MarketDataError> {
        self.check("simple/price")?;
        Ok(self.spot)
    }

    async fn market_chart(
        &self,
        _asset_id: &str,
        _quote_currency: &str,
        _days: u32,
        _interval: &str,
    ) -> Result<MarketChart, MarketDataError> {
        self.check("market_chart")?;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let prices = self
            .prices
            .iter()
            .enumerate()
            .map(|(i, price)| PricePoint {
                timestamp: start + Duration::days(i as i64),
                price: *price,
            })
            .collect();
        Ok(MarketChart {
            prices,
            ..Default::default()
        })
    }

    async fn ohlc(
        &self,
        _asset_id: &str,
        _quote_currency: &str,
        _days: u32,
    ) -> Result<Vec<Candle>, MarketDataError> {
        self.check("ohlc")?;
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let last = self.prices.last().copied().unwrap_or(Decimal::ONE);
        Ok((0..6)
            .map(|i| Candle {
                timestamp: start + Duration::minutes(30 * i),
                open: last,
                high: last,
                low: last,
                close: last,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Text model
// ---------------------------------------------------------------------------

/// Replays scripted responses; once the script runs out, repeats the last.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, u16>>>,
    last: Mutex<Option<Result<String, u16>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    /// Each entry is either response text or an HTTP status to fail with.
    pub fn new(script: Vec<Result<&str, u16>>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|r| r.map(|s| s.to_string()))
                    .collect(),
            ),
            last: Mutex::new(None),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text)])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate_content(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let next = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(step) = script.pop_front() {
                *last = Some(step.clone());
                step
            } else {
                last.clone().unwrap_or(Err(500))
            }
        };

        match next {
            Ok(text) => Ok(text),
            Err(503) => Err(ModelError::Unavailable("HTTP 503".into())),
            Err(status) => Err(ModelError::Api {
                status,
                message: format!("mock failure {status}"),
            }),
        }
    }
}
