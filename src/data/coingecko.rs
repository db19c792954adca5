//! CoinGecko market-data client.
//!
//! API: `https://api.coingecko.com/api/v3`
//! Endpoints used: `/simple/price`, `/coins/{id}/market_chart`,
//! `/coins/{id}/ohlc`. No auth required on the public tier.
//! Rate limit: roughly 10-30 calls/minute on the free tier, so one cycle
//! (three calls) every few minutes is well within budget.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::MarketDataProvider;
use crate::types::{Candle, MarketChart, MarketDataError, PricePoint};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// `/simple/price` → `{ "<id>": { "<currency>": price } }`
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

/// `/coins/{id}/market_chart`. Each series is `[timestamp_ms, value]`.
#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    #[serde(default)]
    prices: Vec<[f64; 2]>,
    #[serde(default)]
    market_caps: Vec<[f64; 2]>,
    #[serde(default)]
    total_volumes: Vec<[f64; 2]>,
}

/// `/coins/{id}/ohlc` rows: `[timestamp_ms, open, high, low, close]`.
type OhlcResponse = Vec<[f64; 5]>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new(base_url: Option<String>, timeout_secs: Option<u64>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(
                timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ))
            .user_agent("crypto-assistant/0.1.0")
            .build()
            .context("Failed to build CoinGecko HTTP client")?;

        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `{base_url}{path}` and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        path: &str,
    ) -> Result<T, MarketDataError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Fetching market data");

        let resp = self.http.get(&url).send().await.map_err(|e| {
            MarketDataError::Unavailable {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MarketDataError::Unavailable {
                endpoint: endpoint.to_string(),
                message: format!("HTTP {status}: {body}"),
            });
        }

        resp.json::<T>().await.map_err(|e| MarketDataError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoClient {
    async fn spot_price(
        &self,
        asset_id: &str,
        quote_currency: &str,
    ) -> Result<Option<Decimal>, MarketDataError> {
        let path = format!(
            "/simple/price?ids={}&vs_currencies={}",
            urlencoding::encode(asset_id),
            urlencoding::encode(quote_currency),
        );
        let body: SimplePriceResponse = self.get_json("simple/price", &path).await?;
        Ok(extract_spot_price(&body, asset_id, quote_currency))
    }

    async fn market_chart(
        &self,
        asset_id: &str,
        quote_currency: &str,
        days: u32,
        interval: &str,
    ) -> Result<MarketChart, MarketDataError> {
        let path = format!(
            "/coins/{}/market_chart?vs_currency={}&days={}&interval={}",
            urlencoding::encode(asset_id),
            urlencoding::encode(quote_currency),
            days,
            urlencoding::encode(interval),
        );
        let body: MarketChartResponse = self.get_json("market_chart", &path).await?;
        Ok(MarketChart {
            prices: to_points(&body.prices),
            market_caps: to_points(&body.market_caps),
            total_volumes: to_points(&body.total_volumes),
        })
    }

    async fn ohlc(
        &self,
        asset_id: &str,
        quote_currency: &str,
        days: u32,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let path = format!(
            "/coins/{}/ohlc?vs_currency={}&days={}",
            urlencoding::encode(asset_id),
            urlencoding::encode(quote_currency),
            days,
        );
        let body: OhlcResponse = self.get_json("ohlc", &path).await?;
        Ok(to_candles(&body))
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn extract_spot_price(
    body: &SimplePriceResponse,
    asset_id: &str,
    quote_currency: &str,
) -> Option<Decimal> {
    body.get(asset_id)
        .and_then(|quotes| quotes.get(quote_currency))
        .and_then(|p| Decimal::from_f64(*p))
}

/// Convert a CoinGecko millisecond timestamp.
fn ms_to_datetime(ms: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms as i64).single()
}

/// Rows that cannot be represented (bad timestamp, non-finite value) are
/// dropped; order is preserved.
fn to_points(rows: &[[f64; 2]]) -> Vec<PricePoint> {
    rows.iter()
        .filter_map(|[ts, value]| {
            Some(PricePoint {
                timestamp: ms_to_datetime(*ts)?,
                price: Decimal::from_f64(*value)?,
            })
        })
        .collect()
}

fn to_candles(rows: &[[f64; 5]]) -> Vec<Candle> {
    rows.iter()
        .filter_map(|[ts, open, high, low, close]| {
            Some(Candle {
                timestamp: ms_to_datetime(*ts)?,
                open: Decimal::from_f64(*open)?,
                high: Decimal::from_f64(*high)?,
                low: Decimal::from_f64(*low)?,
                close: Decimal::from_f64(*close)?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
