//! Strategy: turns account and indicator context into a trading signal.
//!
//! The model's reply is untrusted free text. `signal::parse_signal` is the
//! only gate between that text and an order, and it always falls back to
//! `TradeSignal::Hold`.

pub mod prompt;
pub mod signal;

pub use signal::{parse_signal, SignalExtractor};
