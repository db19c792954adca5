//! Prompt construction for the signal model.

use rust_decimal::Decimal;
use std::fmt::Write as _;

use crate::types::IndicatorSnapshot;

/// Candles shown to the model.
pub const PROMPT_CANDLES: usize = 5;
/// History points shown to the model.
pub const PROMPT_PRICE_POINTS: usize = 7;

/// Human-readable name of the traded asset, e.g. `Bitcoin (BTC/USD)`.
#[derive(Debug, Clone)]
pub struct AssetLabel {
    pub name: String,
    pub symbol: String,
}

impl Default for AssetLabel {
    fn default() -> Self {
        Self {
            name: "Bitcoin".to_string(),
            symbol: "BTC/USD".to_string(),
        }
    }
}

fn or_na(value: Option<Decimal>) -> String {
    value.map(|v| v.round_dp(2).to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// Describe where price and SMA7 sit relative to SMA50.
///
/// Advisory only; the model is free to disagree.
pub fn trend_hint(indicators: &IndicatorSnapshot) -> String {
    let (Some(sma7), Some(sma50)) = (indicators.sma7, indicators.sma50) else {
        return "Not enough history to compare moving averages.".to_string();
    };

    let cross = if sma7 > sma50 {
        "SMA7 is above SMA50 (golden-cross posture)"
    } else if sma7 < sma50 {
        "SMA7 is below SMA50 (death-cross posture)"
    } else {
        "SMA7 equals SMA50"
    };

    match indicators.current_price {
        Some(price) if price > sma50 => format!("Current price is above SMA50; {cross}."),
        Some(price) if price < sma50 => format!("Current price is below SMA50; {cross}."),
        Some(_) => format!("Current price is at SMA50; {cross}."),
        None => format!("Current price unavailable; {cross}."),
    }
}

/// Build the recommendation prompt.
pub fn build_prompt(
    asset: &AssetLabel,
    portfolio_value: Decimal,
    buying_power: Decimal,
    indicators: &IndicatorSnapshot,
) -> String {
    let mut prompt = String::with_capacity(2000);

    let _ = writeln!(
        prompt,
        "Analyze the provided cryptocurrency market data and portfolio status to generate \
         a trading recommendation for {}.",
        asset.name
    );
    prompt.push_str("Your recommendation must be one of: BUY, SELL, or HOLD.\n");
    prompt.push_str("Provide a brief justification for your recommendation based on the data.\n\n");

    prompt.push_str("Portfolio Status:\n");
    let _ = writeln!(prompt, "- Total Portfolio Value (USD): {}", portfolio_value.round_dp(2));
    let _ = writeln!(prompt, "- Available Buying Power (USD): {}", buying_power.round_dp(2));

    let _ = writeln!(prompt, "\nMarket Indicators for {} ({}):", asset.name, asset.symbol);
    let _ = writeln!(prompt, "- Current Price: {}", or_na(indicators.current_price));
    let _ = writeln!(prompt, "- 7-day Simple Moving Average (SMA7): {}", or_na(indicators.sma7));
    let _ = writeln!(prompt, "- 50-day Simple Moving Average (SMA50): {}", or_na(indicators.sma50));

    let _ = writeln!(
        prompt,
        "- Recent OHLC (Open, High, Low, Close), last {PROMPT_CANDLES} periods:"
    );
    let candles = indicators.recent_candles(PROMPT_CANDLES);
    if candles.is_empty() {
        prompt.push_str("  N/A\n");
    }
    for c in candles {
        let _ = writeln!(prompt, "  {c}");
    }

    let _ = writeln!(
        prompt,
        "- Historical Price Points, last {PROMPT_PRICE_POINTS}:"
    );
    let points = indicators.recent_prices(PROMPT_PRICE_POINTS);
    if points.is_empty() {
        prompt.push_str("  N/A\n");
    }
    for p in points {
        let _ = writeln!(prompt, "  {}: {}", p.timestamp.format("%Y-%m-%d"), p.price.round_dp(2));
    }

    prompt.push_str("\nConsider the current price relative to moving averages.\n");
    prompt.push_str(
        "A common strategy is to BUY if current price is above SMA50 and SMA7 is above SMA50 (golden cross).\n",
    );
    prompt.push_str(
        "SELL if current price is below SMA50 and SMA7 is below SMA50 (death cross).\n",
    );
    prompt.push_str("Otherwise, HOLD or consider other factors.\n");
    let _ = writeln!(prompt, "Observation: {}", trend_hint(indicators));

    prompt.push_str(
        "\nBased on this data, what is your trading recommendation (BUY, SELL, or HOLD) \
         and a brief justification?\nRecommendation:",
    );

    prompt
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
