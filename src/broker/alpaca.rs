//! Alpaca brokerage integration.
//!
//! API docs: https://docs.alpaca.markets/reference
//! Paper base URL: https://paper-api.alpaca.markets
//! Auth: `APCA-API-KEY-ID` / `APCA-API-SECRET-KEY` headers.
//! Numeric account/position fields arrive as JSON strings.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use super::Broker;
use crate::types::{
    AccountState, BrokerError, OrderReceipt, OrderRequest, OrderSide, OrderType, Position,
    TimeInForce,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const PAPER_BASE_URL: &str = "https://paper-api.alpaca.markets";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AlpacaAccount {
    equity: String,
    buying_power: String,
}

#[derive(Debug, Serialize)]
struct AlpacaOrderRequest<'a> {
    symbol: &'a str,
    notional: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    time_in_force: TimeInForce,
    client_order_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct AlpacaOrder {
    id: String,
    #[serde(default)]
    client_order_id: Option<String>,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    side: Option<OrderSide>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct AlpacaPosition {
    symbol: String,
    qty: String,
    #[serde(default)]
    market_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaErrorBody {
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AlpacaClient {
    http: Client,
    base_url: String,
    key_id: SecretString,
    secret_key: SecretString,
}

impl AlpacaClient {
    pub fn new(
        base_url: Option<String>,
        key_id: SecretString,
        secret_key: SecretString,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("crypto-assistant/0.1.0")
            .build()
            .context("Failed to build HTTP client for Alpaca")?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| PAPER_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            key_id,
            secret_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether this client points at the paper-trading environment.
    pub fn is_paper(&self) -> bool {
        self.base_url.contains("paper")
    }

    // -- Internal helpers ------------------------------------------------

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("APCA-API-KEY-ID", self.key_id.expose_secret().as_str())
            .header("APCA-API-SECRET-KEY", self.secret_key.expose_secret().as_str())
    }

    /// Send a request and decode the JSON body, mapping HTTP failures.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, BrokerError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| BrokerError::Transport(format!("{what}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(error_from_status(status.as_u16(), &body, what));
        }

        resp.json::<T>()
            .await
            .map_err(|e| BrokerError::Decode(format!("{what}: {e}")))
    }
}

/// Positions endpoints accept the slash-less crypto symbol (`BTCUSD`).
fn position_path(symbol: &str) -> String {
    format!("/v2/positions/{}", urlencoding::encode(&symbol.replace('/', "")))
}

fn error_from_status(status: u16, body: &str, what: &str) -> BrokerError {
    let message = serde_json::from_str::<AlpacaErrorBody>(body)
        .map(|b| b.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());

    if status == 404 {
        BrokerError::NotFound(format!("{what}: {message}"))
    } else {
        BrokerError::Api {
            status,
            message: format!("{what}: {message}"),
        }
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, BrokerError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| BrokerError::Decode(format!("invalid {field} '{raw}': {e}")))
}

fn to_position(position: AlpacaPosition) -> Result<Position, BrokerError> {
    Ok(Position {
        qty: parse_decimal("qty", &position.qty)?,
        market_value: position
            .market_value
            .as_deref()
            .and_then(|v| Decimal::from_str(v.trim()).ok()),
        symbol: position.symbol,
    })
}

fn to_receipt(order: AlpacaOrder) -> OrderReceipt {
    OrderReceipt {
        order_id: order.id,
        client_order_id: order.client_order_id,
        symbol: order.symbol,
        side: order.side,
        status: order.status,
        submitted_at: order.submitted_at.unwrap_or_else(Utc::now),
    }
}

#[async_trait]
impl Broker for AlpacaClient {
    async fn get_account(&self) -> Result<AccountState, BrokerError> {
        let account: AlpacaAccount = self
            .send(self.request(Method::GET, "/v2/account"), "get account")
            .await?;

        Ok(AccountState {
            equity: parse_decimal("equity", &account.equity)?,
            buying_power: parse_decimal("buying_power", &account.buying_power)?,
        })
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BrokerError> {
        let body = AlpacaOrderRequest {
            symbol: &order.symbol,
            notional: order.notional.to_string(),
            side: order.side,
            order_type: order.order_type,
            time_in_force: order.time_in_force,
            client_order_id: &order.client_order_id,
        };

        debug!(
            symbol = %order.symbol,
            notional = %order.notional,
            client_order_id = %order.client_order_id,
            "Submitting Alpaca order"
        );

        let created: AlpacaOrder = self
            .send(
                self.request(Method::POST, "/v2/orders").json(&body),
                "create order",
            )
            .await?;

        Ok(to_receipt(created))
    }

    async fn get_position(&self, symbol: &str) -> Result<Position, BrokerError> {
        let position: AlpacaPosition = self
            .send(
                self.request(Method::GET, &position_path(symbol)),
                "get position",
            )
            .await?;

        to_position(position)
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderReceipt, BrokerError> {
        let order: AlpacaOrder = self
            .send(
                self.request(Method::DELETE, &position_path(symbol)),
                "close position",
            )
            .await?;

        Ok(to_receipt(order))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
