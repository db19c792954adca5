//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults, so a missing section behaves like the
//! paper-trading Bitcoin setup. Secrets (API keys) are referenced by
//! env-var name in the config and resolved at runtime into `SecretString`.

use anyhow::{bail, Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::cycle::MarketTarget;
use crate::engine::executor::ExecutorConfig;
use crate::strategy::prompt::AssetLabel;
use crate::types::RetryPolicy;

pub const SUPPORTED_PROVIDERS: &[&str] = &["gemini", "openai"];

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub market_data: MarketDataConfig,
    pub broker: BrokerConfig,
    pub llm: LlmConfig,
    pub signal: RetryConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub cycle_interval_secs: u64,
    /// Run the first cycle immediately instead of after one interval.
    pub run_on_startup: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "crypto-assistant".to_string(),
            cycle_interval_secs: 300,
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: Option<String>,
    /// Env var that overrides `base_url` when set.
    pub base_url_env: Option<String>,
    pub asset_id: String,
    /// Display name used in the prompt.
    pub asset_name: String,
    pub quote_currency: String,
    pub history_days: u32,
    pub interval: String,
    pub ohlc_days: u32,
    pub timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            base_url_env: Some("MARKET_DATA_API_URL".to_string()),
            asset_id: "bitcoin".to_string(),
            asset_name: "Bitcoin".to_string(),
            quote_currency: "usd".to_string(),
            history_days: 60,
            interval: "daily".to_string(),
            ohlc_days: 1,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: Option<String>,
    pub base_url_env: Option<String>,
    pub key_id_env: String,
    pub secret_key_env: String,
    pub symbol: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            base_url_env: Some("ALPACA_BASE_URL".to_string()),
            key_id_env: "ALPACA_API_KEY_ID".to_string(),
            secret_key_env: "ALPACA_SECRET_KEY".to_string(),
            symbol: "BTC/USD".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    /// Override for OpenAI-compatible gateways or a Gemini proxy.
    pub base_url: Option<String>,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash-latest".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 512,
        }
    }
}

/// Bounded fixed-delay retry settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 10,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_delay_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub buy_fraction: f64,
    pub min_notional: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 5,
            buy_fraction: 0.9,
            min_notional: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.cycle_interval_secs == 0 {
            bail!("agent.cycle_interval_secs must be greater than zero");
        }
        if self.market_data.history_days < 1 {
            bail!("market_data.history_days must be at least 1");
        }
        let fraction = self.execution.buy_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            bail!("execution.buy_fraction must be in (0, 1], got {fraction}");
        }
        if self.execution.min_notional.is_nan() || self.execution.min_notional < 0.0 {
            bail!(
                "execution.min_notional must not be negative, got {}",
                self.execution.min_notional
            );
        }
        if !SUPPORTED_PROVIDERS.contains(&self.llm.provider.as_str()) {
            bail!(
                "Unknown llm.provider '{}' (expected one of: {})",
                self.llm.provider,
                SUPPORTED_PROVIDERS.join(", ")
            );
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Used for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<SecretString> {
        std::env::var(env_name)
            .map(SecretString::new)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve a non-secret env override, ignoring unset or blank values.
    pub fn env_override(env_name: Option<&str>) -> Option<String> {
        env_name
            .and_then(|name| std::env::var(name).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn market_data_base_url(&self) -> Option<String> {
        Self::env_override(self.market_data.base_url_env.as_deref())
            .or_else(|| self.market_data.base_url.clone())
    }

    pub fn broker_base_url(&self) -> Option<String> {
        Self::env_override(self.broker.base_url_env.as_deref())
            .or_else(|| self.broker.base_url.clone())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.agent.cycle_interval_secs)
    }

    pub fn market_target(&self) -> MarketTarget {
        MarketTarget {
            asset_id: self.market_data.asset_id.clone(),
            quote_currency: self.market_data.quote_currency.clone(),
            history_days: self.market_data.history_days,
            interval: self.market_data.interval.clone(),
        }
    }

    pub fn asset_label(&self) -> AssetLabel {
        AssetLabel {
            name: self.market_data.asset_name.clone(),
            symbol: self.broker.symbol.clone(),
        }
    }

    pub fn executor_config(&self) -> Result<ExecutorConfig> {
        let buy_fraction = Decimal::from_f64(self.execution.buy_fraction)
            .context("execution.buy_fraction is not representable as a decimal")?;
        let min_notional = Decimal::from_f64(self.execution.min_notional)
            .context("execution.min_notional is not representable as a decimal")?;

        Ok(ExecutorConfig {
            symbol: self.broker.symbol.clone(),
            buy_fraction,
            min_notional,
            retry: RetryPolicy::new(
                self.execution.max_retries,
                Duration::from_secs(self.execution.retry_delay_secs),
            ),
        })
    }
}
