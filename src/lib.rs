//! Crypto trading assistant.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod broker;
pub mod config;
pub mod data;
pub mod engine;
pub mod llm;
pub mod strategy;
pub mod types;
