//! Indicator aggregation.
//!
//! Pulls spot price, history and OHLC candles from a `MarketDataProvider`
//! and derives the short/long simple moving averages. Provider failures
//! propagate to the caller untouched; the cycle decides what to do.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::MarketDataProvider;
use crate::types::{IndicatorSnapshot, MarketDataError, PricePoint};

/// Short moving-average window (data points).
pub const SHORT_WINDOW: usize = 7;
/// Long moving-average window (data points).
pub const LONG_WINDOW: usize = 50;

/// OHLC lookback, in days.
pub const DEFAULT_OHLC_DAYS: u32 = 1;

/// Arithmetic mean of the last `window` prices.
///
/// `None` when fewer than `window` points exist or `window` is zero.
pub fn simple_moving_average(prices: &[PricePoint], window: usize) -> Option<Decimal> {
    if window == 0 || prices.len() < window {
        return None;
    }
    let sum: Decimal = prices[prices.len() - window..].iter().map(|p| p.price).sum();
    Some(sum / Decimal::from(window))
}

pub struct IndicatorAggregator {
    provider: Arc<dyn MarketDataProvider>,
    ohlc_days: u32,
}

impl IndicatorAggregator {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            ohlc_days: DEFAULT_OHLC_DAYS,
        }
    }

    pub fn with_ohlc_days(mut self, days: u32) -> Self {
        self.ohlc_days = days;
        self
    }

    /// Fetch a fresh `IndicatorSnapshot`.
    ///
    /// The three reads are independent and issued together. A missing spot
    /// price is logged and left as `None`; missing history just omits the
    /// SMA fields.
    pub async fn fetch_indicators(
        &self,
        asset_id: &str,
        quote_currency: &str,
        history_days: u32,
        interval: &str,
    ) -> Result<IndicatorSnapshot, MarketDataError> {
        info!(asset = asset_id, quote = quote_currency, "Fetching market data");

        let (current_price, chart, ohlc) = futures::try_join!(
            self.provider.spot_price(asset_id, quote_currency),
            self.provider
                .market_chart(asset_id, quote_currency, history_days, interval),
            self.provider.ohlc(asset_id, quote_currency, self.ohlc_days),
        )?;

        match current_price {
            Some(price) => info!(
                asset = asset_id,
                quote = %quote_currency.to_uppercase(),
                price = %price,
                "Market data fetched"
            ),
            None => warn!(asset = asset_id, "Current price not found in provider response"),
        }

        let sma7 = simple_moving_average(&chart.prices, SHORT_WINDOW);
        let sma50 = simple_moving_average(&chart.prices, LONG_WINDOW);

        if let Some(v) = sma7 {
            info!(asset = asset_id, sma7 = %v, "SMA 7 computed");
        }
        if let Some(v) = sma50 {
            info!(asset = asset_id, sma50 = %v, "SMA 50 computed");
        }
        debug!(
            history_points = chart.prices.len(),
            candles = ohlc.len(),
            "Indicator snapshot assembled"
        );

        Ok(IndicatorSnapshot {
            current_price,
            historical_prices: chart.prices,
            market_caps: chart.market_caps,
            total_volumes: chart.total_volumes,
            ohlc,
            sma7,
            sma50,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
