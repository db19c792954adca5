//! Market data.
//!
//! Defines the `MarketDataProvider` trait, the CoinGecko implementation,
//! and the `IndicatorAggregator` that turns raw provider reads into an
//! `IndicatorSnapshot`.

pub mod coingecko;
pub mod indicators;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{Candle, MarketChart, MarketDataError};

/// Abstraction over a spot/history/OHLC market-data source.
///
/// Implementors return raw provider values verbatim; no re-sorting,
/// smoothing or gap-filling.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Current spot price of `asset_id` in `quote_currency`.
    /// `Ok(None)` when the provider omits the price from its response.
    async fn spot_price(
        &self,
        asset_id: &str,
        quote_currency: &str,
    ) -> Result<Option<Decimal>, MarketDataError>;

    /// Historical prices, market caps and volumes for the last `days` days.
    async fn market_chart(
        &self,
        asset_id: &str,
        quote_currency: &str,
        days: u32,
        interval: &str,
    ) -> Result<MarketChart, MarketDataError>;

    /// OHLC candles for the last `days` days.
    async fn ohlc(
        &self,
        asset_id: &str,
        quote_currency: &str,
        days: u32,
    ) -> Result<Vec<Candle>, MarketDataError>;
}
