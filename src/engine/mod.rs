//! Core engine: the account → indicators → signal → trade cycle.

pub mod cycle;
pub mod executor;

pub use cycle::{CycleOrchestrator, CycleReport, MarketTarget};
pub use executor::{ExecutionOutcome, ExecutorConfig, SkipReason, TradeExecutor};
