//! Crypto trading assistant.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the market-data, model and broker clients into the cycle
//! orchestrator, and runs one cycle per interval until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crypto_assistant::broker::alpaca::AlpacaClient;
use crypto_assistant::broker::Broker;
use crypto_assistant::config::{self, AppConfig};
use crypto_assistant::data::coingecko::CoinGeckoClient;
use crypto_assistant::data::indicators::IndicatorAggregator;
use crypto_assistant::engine::{CycleOrchestrator, TradeExecutor};
use crypto_assistant::llm::gemini::GeminiClient;
use crypto_assistant::llm::openai::OpenAiClient;
use crypto_assistant::llm::TextGenerator;
use crypto_assistant::strategy::SignalExtractor;

const CONFIG_PATH_ENV: &str = "ASSISTANT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;
    cfg.validate().context("Invalid configuration")?;

    init_logging(&cfg);

    info!(
        agent_name = %cfg.agent.name,
        cycle_interval_secs = cfg.agent.cycle_interval_secs,
        symbol = %cfg.broker.symbol,
        provider = %cfg.llm.provider,
        "Crypto assistant starting up"
    );

    let orchestrator = build_orchestrator(&cfg)?;

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(cfg.cycle_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    if !cfg.agent.run_on_startup {
        // first tick of a tokio interval completes immediately
        interval.tick().await;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.cycle_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let mut cycles: u64 = 0;
    let mut completed: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                cycles += 1;
                info!(cycle = cycles, "Cycle triggered");
                if orchestrator.run_cycle().await.is_some() {
                    completed += 1;
                } else {
                    warn!(cycle = cycles, "Cycle ended early; continuing to next");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(cycles, completed, "Crypto assistant shut down cleanly.");
    Ok(())
}

/// Construct every collaborator from config and secrets.
fn build_orchestrator(cfg: &AppConfig) -> Result<CycleOrchestrator> {
    // Market data
    let market_data = CoinGeckoClient::new(
        cfg.market_data_base_url(),
        Some(cfg.market_data.timeout_secs),
    )?;
    info!(base_url = %market_data.base_url(), "Market data provider ready");
    let aggregator =
        IndicatorAggregator::new(Arc::new(market_data)).with_ohlc_days(cfg.market_data.ohlc_days);

    // Broker
    let key_id = AppConfig::resolve_env(&cfg.broker.key_id_env)
        .context("Broker key id missing")?;
    let secret_key = AppConfig::resolve_env(&cfg.broker.secret_key_env)
        .context("Broker secret key missing")?;
    info!(
        key_id_env = %cfg.broker.key_id_env,
        secret_key_env = %cfg.broker.secret_key_env,
        "Broker credentials loaded"
    );
    let alpaca = AlpacaClient::new(cfg.broker_base_url(), key_id, secret_key)?;
    if alpaca.is_paper() {
        info!(base_url = %alpaca.base_url(), "Using paper trading endpoint");
    } else {
        warn!(base_url = %alpaca.base_url(), "Using LIVE trading endpoint");
    }
    let broker: Arc<dyn Broker> = Arc::new(alpaca);

    // Text model
    let model = build_model(&cfg.llm)?;
    let signals =
        SignalExtractor::new(model, cfg.asset_label()).with_retry_policy(cfg.signal.policy());

    let executor = TradeExecutor::new(broker.clone(), cfg.executor_config()?);

    Ok(CycleOrchestrator::new(
        broker,
        aggregator,
        signals,
        executor,
        cfg.market_target(),
    ))
}

fn build_model(llm: &config::LlmConfig) -> Result<Arc<dyn TextGenerator>> {
    let api_key = AppConfig::resolve_env(&llm.api_key_env).context("Model API key missing")?;
    info!(api_key_env = %llm.api_key_env, "Model API key loaded");

    let model: Arc<dyn TextGenerator> = match llm.provider.as_str() {
        "openai" => {
            let client = OpenAiClient::new(
                api_key,
                Some(llm.model.clone()),
                llm.base_url.clone(),
                Some(llm.max_tokens),
            )?;
            info!(model = %client.model_name(), "Using OpenAI-compatible model provider");
            Arc::new(client)
        }
        // validate() has already rejected anything else
        _ => {
            let client = GeminiClient::new(
                api_key,
                Some(llm.model.clone()),
                llm.base_url.clone(),
                Some(llm.max_tokens),
            )?;
            info!(model = %client.model_name(), "Using Gemini model provider");
            Arc::new(client)
        }
    };
    Ok(model)
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crypto_assistant=info"));

    let json_logging = cfg.logging.json || std::env::var("ASSISTANT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
