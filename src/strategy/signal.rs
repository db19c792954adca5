//! Signal extraction from the model's free-text recommendation.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::prompt::{build_prompt, AssetLabel};
use crate::llm::TextGenerator;
use crate::types::{IndicatorSnapshot, RetryPolicy, TradeSignal};

/// Attempts allowed after the first call when the model is unavailable.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Fixed wait between model retries.
pub const DEFAULT_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(10);

/// First standalone BUY / SELL / HOLD token.
static SIGNAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(BUY|SELL|HOLD)\b").expect("Invalid signal pattern regex"));

/// Find the first whole-word BUY, SELL or HOLD in `text`, case-insensitive.
pub fn find_signal_token(text: &str) -> Option<TradeSignal> {
    let normalized = text.trim().to_uppercase();
    SIGNAL_PATTERN
        .captures(&normalized)
        .and_then(|caps| caps.get(1))
        .and_then(|m| TradeSignal::from_token(m.as_str()))
}

/// Reduce model text to a signal. No match means `Hold`.
pub fn parse_signal(text: &str) -> TradeSignal {
    find_signal_token(text).unwrap_or(TradeSignal::Hold)
}

/// Asks the text model for a recommendation and reduces it to a signal.
///
/// Never returns an error: any failure, including an exhausted retry
/// budget, resolves to `TradeSignal::Hold`.
pub struct SignalExtractor {
    model: Arc<dyn TextGenerator>,
    asset: AssetLabel,
    retry: RetryPolicy,
}

impl SignalExtractor {
    pub fn new(model: Arc<dyn TextGenerator>, asset: AssetLabel) -> Self {
        Self {
            model,
            asset,
            retry: RetryPolicy::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn extract_signal(
        &self,
        portfolio_value: Decimal,
        buying_power: Decimal,
        indicators: &IndicatorSnapshot,
    ) -> TradeSignal {
        info!("Requesting trading recommendation");
        let prompt = build_prompt(&self.asset, portfolio_value, buying_power, indicators);
        debug!(prompt_len = prompt.len(), "Prompt built");

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                info!(
                    attempt,
                    max_retries = self.retry.max_retries,
                    "Retrying recommendation request"
                );
                tokio::time::sleep(self.retry.delay).await;
            }

            match self.model.generate_content(&prompt).await {
                Ok(text) => return Self::interpret(&text),
                Err(e) if e.is_unavailable() => {
                    warn!(attempt, error = %e, "Model temporarily unavailable");
                }
                Err(e) => {
                    error!(error = %e, "Recommendation request failed; defaulting to HOLD");
                    return TradeSignal::Hold;
                }
            }
        }

        error!(
            max_retries = self.retry.max_retries,
            "Max retries reached for recommendation; defaulting to HOLD"
        );
        TradeSignal::Hold
    }

    fn interpret(text: &str) -> TradeSignal {
        debug!(raw = %text.trim(), "Raw recommendation text");
        let signal = match find_signal_token(text) {
            Some(signal) => signal,
            None => {
                warn!(
                    raw = %text.trim(),
                    "Could not extract BUY/SELL/HOLD from model response; defaulting to HOLD"
                );
                TradeSignal::Hold
            }
        };
        info!(signal = %signal, "Recommendation extracted");
        signal
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
